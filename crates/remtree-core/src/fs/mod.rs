//! Remote file representations.
//!
//! [`entry::FileEntry`] is the immutable listing value shared by every
//! component; [`path`] holds the POSIX path arithmetic used to walk remote
//! trees regardless of the local platform's separator.

pub mod entry;
pub mod path;
