//! # docbook-xtm
//!
//! Converts DocBook training guides between their authored, multi-file
//! layout and a flattened "prep" layout for translation tools that parse
//! files in file name order.
//!
//! ## Unsourcing
//!
//! A guide's table of contents (`guides/en-US/<course>-SG.xml`) references
//! its documents through `href` attributes. [`docbook::TreeWalker`] expands
//! that tree in reading order, [`mapping::BookPlan`] assigns each document a
//! bucket and a two-digit ordinal, and [`assemble::Assembler::unsource`]
//! writes the renamed documents into a new archive:
//!
//! ```text
//! en-US/00-introduction/01-Book_Info.xml
//! en-US/01-ch01-intro/01-ch01-intro.xml
//! en-US/01-ch01-intro/topics/01-s1.xml
//! en-US/99-appendix/01-appendix-a.xml
//! ```
//!
//! ## Resourcing
//!
//! [`assemble::Assembler::resource`] maps a translated prep archive back
//! onto the source archive. [`reconcile::reconcile`] tolerates renamed and
//! dropped files, and the guide's locale is derived from its translated
//! subtitle.
//!
//! ```no_run
//! use std::path::Path;
//! use docbook_xtm::Assembler;
//!
//! let assembler = Assembler::new(".", ".");
//! let report = assembler.unsource(Path::new("RH124-RHEL9.0-en-1-20220609.zip"))?;
//! println!("{}", report.archive.display());
//! # Ok::<(), docbook_xtm::Error>(())
//! ```

pub mod archive;
pub mod assemble;
pub mod book;
pub mod config;
pub mod docbook;
pub mod error;
pub mod fetch;
pub mod fuzz;
#[cfg(feature = "cli")]
pub mod logging;
pub mod mapping;
pub mod reconcile;
pub mod repair;
pub(crate) mod util;

pub use archive::SourceArchive;
pub use assemble::{Assembler, RunReport};
pub use book::BookMetadata;
pub use config::Config;
pub use error::{Error, Result};
pub use fetch::{GithubFetcher, HttpClient, ReqwestClient};
pub use mapping::{BookPlan, ContentFile, FileMapping};
pub use reconcile::{Reconciliation, reconcile};
