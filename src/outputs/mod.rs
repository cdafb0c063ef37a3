//! Files written next to the pipeline's primary outputs.
//!
//! # Submodules
//!
//! - [`report`]: JSON summary of one run, for schedulers and dashboards
//!
//! # Output Structure
//!
//! ```text
//! report_dir/
//! ├── 20250714T000500Z_run.json
//! └── 20250715T083000Z_reload.json
//! ```

pub mod report;
