//! Engine services
//!
//! Each service owns one concern of the categorization flow. The
//! workflow orchestrator composes them; nothing here holds mutable
//! cross-service state.

pub mod classifier_client;
pub mod confidence_router;
pub mod dataset_identity;
pub mod duplicate_resolver;
pub mod group_indexer;
pub mod page_cache;
pub mod prompt_builder;
pub mod response_validator;
