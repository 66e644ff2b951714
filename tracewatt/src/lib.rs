//! # tracewatt - Source-Level CPU Attribution for Sampled Profiles
//!
//! tracewatt takes a sampled call tree (a V8 `.cpuprofile` or a cleaned
//! call tree JSON) and attributes CPU time to the source nodes that spent
//! it: functions, methods and scopes of the project, of every external
//! module it depends on, and of the language runtime. Calls that cross a
//! scope boundary become reference edges, so time spent inside
//! dependencies is visible from the project code that called them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 .cpuprofile / call tree JSON                    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ profiling::cpuprofile
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CallTree                                 │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ profiling::insert  ◀── resolution
//!                         ▼                        (heuristic / table)
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ProjectReport                                                  │
//! │   ├── GlobalIndex   module → path → dotted identifier → id      │
//! │   └── Report        intern / lang_internal / extern modules     │
//! └───────┬───────────────────┬───────────────────┬─────────────────┘
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!  │  Call Graph  │   │ Aggregation  │   │   Hotspots   │
//!  │ reachability │   │     Tree     │   │  (by self)   │
//!  └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`domain`]: identifiers, code locations and error types
//! - [`index`]: the identifier index with its single id counter
//! - [`model`]: sensor values, node/file metadata, reports, merging
//! - [`profiling`]: call tree input, `.cpuprofile` import, insertion engine
//! - [`classification`]: path patterns for project/extern/runtime code
//! - [`resolution`]: location resolvers used by the insertion engine
//! - [`analysis`]: call graph, aggregation tree, hotspot ranking
//! - [`export`]: report JSON persistence
//! - [`cli`]: command-line argument parsing and configuration
//!
//! ## Key Concepts
//!
//! - **Self time**: samples whose top frame is the node
//! - **Aggregated time**: time of every call-tree subtree rooted at the
//!   node, counted once per outermost occurrence so recursion doesn't
//!   inflate it
//! - **Reference edge**: caller → callee record carrying the callee's
//!   subtree time; the caller's `internCPUTime`, `externCPUTime` or
//!   `langInternalCPUTime` grows by the same amount
//! - **Headless time**: samples with no resolvable frame on the stack

pub mod analysis;
pub mod classification;
pub mod cli;
pub mod domain;
pub mod export;
pub mod index;
pub mod model;
pub mod profiling;
pub mod resolution;
