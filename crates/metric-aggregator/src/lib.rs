//! Concept Metrics Aggregator
//!
//! Counts how many content items annotate each concept in a Neo4j knowledge
//! graph, for a caller-supplied batch of concept UUIDs:
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │    query     │──►│   executor   │──►│  aggregate   │──►│   service    │
//! │ (1 per uuid) │   │ (1 round     │   │ (rows → map) │   │ (map → input │
//! └──────────────┘   │  trip)       │   └──────────────┘   │  order)      │
//!                    └──────┬───────┘                      └──────────────┘
//!                           │
//!                    ┌──────▼───────┐
//!                    │ GraphDriver  │  Neo4j HTTP  |  in-memory
//!                    └──────────────┘
//! ```
//!
//! ## Key properties
//!
//! - **One round trip**: the whole batch goes to the store as one pipelined call.
//! - **Order preserving**: results follow the order of the requested UUIDs.
//! - **Missing is omitted**: a UUID with no concept node is left out of the
//!   result, never reported with zero counts.
//! - **No partial results**: a batch either fully succeeds or fully fails.

pub mod aggregate;
pub mod counter;
pub mod driver;
pub mod error;
pub mod executor;
pub mod health;
pub mod memory;
pub mod model;
pub mod neo4j;
pub mod query;
pub mod service;

pub use aggregate::aggregate;
pub use counter::{AnnotationsCounter, GraphAnnotationsCounter};
pub use driver::{GraphDriver, ResultSet};
pub use error::{MetricsError, StoreError, ValidationError};
pub use executor::execute_batch;
pub use health::{HealthProbe, ProbeFailure, HEALTHY_MESSAGE};
pub use memory::{FailureMode, InMemoryGraph};
pub use model::{ConceptResult, Metrics, RawRow};
pub use neo4j::{Neo4jConfig, Neo4jHttpDriver};
pub use query::{build_queries, build_queries_at, ParameterizedQuery, DEFAULT_RECENT_WINDOW};
pub use service::{ConceptMetricsService, ConceptMetricsSource, RequestContext};
