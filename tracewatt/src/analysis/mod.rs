//! Analysis of finished reports
//!
//! Everything here reads a frozen [`crate::model::ProjectReport`]:
//! - Call graph with memoized reachability
//! - Directory tree with total/max aggregates
//! - Hotspot ranking by self time

pub mod aggregation_tree;
pub mod call_graph;
pub mod hotspot_analyzer;

pub use aggregation_tree::{AggregateMetaData, SourceFileMetaDataTree, TreeNode, TreeNodeKind};
pub use call_graph::{GraphNode, GraphNodeKey, SourceNodeGraph};
pub use hotspot_analyzer::{analyze_hotspots, HotspotStats, SourceNodeHotspot};
