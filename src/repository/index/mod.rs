// src/repository/index/mod.rs

//! Native repository index formats
//!
//! One module per ecosystem. Each writes the index files a package manager
//! fetches (`Packages`, `primary.xml`, `APKINDEX`, pacman database, formula)
//! and reads a previously published index back into [`Package`] records for
//! incremental updates.
//!
//! [`Package`]: crate::packages::Package

pub mod alpine;
pub mod arch;
pub mod debian;
pub mod fedora;
pub mod homebrew;
