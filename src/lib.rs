// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Overlay installer for external project checkouts.
//!
//! An __overlay__ is a tree of files kept outside of some larger project, the
//! __root__, that modifies or extends it. A __correspondence table__ maps
//! overlay paths to destination directories inside the root. Graft installs
//! the overlay into the root, cleans it back out, and pulls changes made in
//! the root back into the overlay.
//!
//! # Backups
//!
//! Every install starts a new __backup generation__ for its root. Files that
//! get overwritten are copied into the generation first, mirroring their
//! absolute path. Clean restores the current generation. Older generations
//! are kept under a timestamped name, and are never touched again.
//!
//! # Version Guards
//!
//! Roots are identified by marker files, and are expected to be checked out
//! at a specific revision tag. A mismatch is never fatal on its own, but the
//! operator has to agree before anything gets written.

pub mod backup;
pub mod config;
pub mod guard;
pub mod overlay;
pub mod path;
pub mod sync;
pub mod table;
