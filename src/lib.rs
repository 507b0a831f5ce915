#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::complexity,
    clippy::correctness,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    deprecated,
    unused,
    clippy::todo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::unreachable,
    clippy::missing_safety_doc,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::missing_docs
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::option_if_let_else,
    clippy::cognitive_complexity,
    clippy::too_many_lines,
    clippy::similar_names,
    clippy::struct_excessive_bools,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp,
    clippy::doc_markdown,
    clippy::wildcard_imports,
    clippy::struct_field_names,
    clippy::module_inception,
    clippy::missing_fields_in_debug,
    clippy::use_self,
    clippy::return_self_not_must_use,
    clippy::bool_to_int_with_if,
    clippy::partial_pub_fields,
    clippy::multiple_crate_versions,
    clippy::single_match_else,
    clippy::implicit_hasher,
    clippy::linkedlist,
    clippy::default_trait_access,
    clippy::missing_transmute_annotations,
    clippy::multiple_inherent_impl,
    clippy::get_unwrap,
    clippy::impl_trait_in_params,
    clippy::future_not_send,
    clippy::type_complexity,
    clippy::result_large_err,
    clippy::large_stack_frames,
    clippy::significant_drop_in_scrutinee,
    clippy::significant_drop_tightening,
    clippy::items_after_statements,
    clippy::match_wildcard_for_single_variants,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::unused_async,
    clippy::unnecessary_wraps,
    clippy::trivially_copy_pass_by_ref,
    clippy::match_same_arms,
    clippy::explicit_deref_methods,
    clippy::explicit_iter_loop,
    clippy::explicit_into_iter_loop,
    clippy::from_iter_instead_of_collect,
    clippy::if_not_else,
    clippy::equatable_if_let,
    clippy::or_fun_call,
    clippy::iter_without_into_iter,
    clippy::infinite_loop,
    clippy::ref_as_ptr,
    clippy::ref_option_ref,
    clippy::option_option,
    clippy::match_bool,
    clippy::let_underscore_untyped,
    clippy::empty_enum_variants_with_brackets,
    clippy::pattern_type_mismatch,
    clippy::ignored_unit_patterns,
    clippy::redundant_pub_crate,
    clippy::allow_attributes,
    clippy::no_effect_underscore_binding,
    clippy::used_underscore_binding,
    clippy::tests_outside_test_module
)]

//! # shardkv — a disk-backed, sharded key-value store
//!
//! `shardkv` is a DynamoDB-wire-compatible key-value store: schemaless items
//! keyed by a partition key and an optional sort key, distributed across a
//! fixed number of shards, with cross-shard atomic writes via two-phase
//! commit.
//!
//! ## Features
//!
//! - **Sharded storage**: each table's rows are distributed across a fixed
//!   number of independently-locked shards by a hash of the partition key.
//! - **Condition and update expressions**: conditional writes and partial
//!   updates (`SET`/`REMOVE`/`ADD`/`DELETE`) evaluated against a tagged-variant
//!   attribute value model.
//! - **Cross-shard transactions**: `TransactWriteItems`/`TransactGetItems`
//!   with canonical lock ordering to avoid deadlock and all-or-nothing commit.
//! - **Idempotent retries**: a client request token caches a transaction's
//!   terminal outcome so a retried call never re-executes.
//!
//! ## Quick start
//!
//! ```no_run
//! use shardkv::{Config, Store};
//! use shardkv::core::catalog::KeyAttribute;
//! use shardkv::core::common::value::{AttributeValue, ScalarType, Item};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(Config::default())?;
//! store.create_table(
//!     "widgets",
//!     KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
//!     None,
//!     "2026-01-01T00:00:00Z".into(),
//! )?;
//!
//! let mut item = Item::new();
//! item.insert("id".into(), AttributeValue::S("w1".into()));
//! store.put_item("widgets", item, None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Router**: maps a partition key to a shard index.
//! - **Shard storage**: one file-backed key-value engine per shard, guarding
//!   its own lock table and staged writes.
//! - **Transaction coordinator**: drives the cross-shard two-phase-commit
//!   state machine.
//! - **Table catalog**: the name → key-schema map every operation resolves
//!   through.
//! - **Store**: the public contract layer tying the above together.

pub mod core;

pub use crate::core::common::error::StoreError;
pub use crate::core::common::value::{AttributeValue, Item};
pub use crate::core::config::Config;
pub use crate::core::store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::KeyAttribute;
    use crate::core::common::value::ScalarType;
    use tempfile::TempDir;

    #[test]
    fn put_then_get_round_trips_an_item() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config { data_dir: temp_dir.path().to_string_lossy().into_owned(), ..Config::default() };
        let store = Store::open(config).expect("failed to open store");

        store
            .create_table(
                "widgets",
                KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .expect("failed to create table");

        let mut item = Item::new();
        item.insert("id".into(), AttributeValue::S("w1".into()));
        item.insert("label".into(), AttributeValue::S("first widget".into()));
        store.put_item("widgets", item.clone(), None).expect("failed to put item");

        let mut key = Item::new();
        key.insert("id".into(), AttributeValue::S("w1".into()));
        let fetched = store.get_item("widgets", &key, None).expect("failed to get item");
        assert_eq!(fetched, Some(item));
    }

    #[test]
    fn delete_table_then_describe_is_resource_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config { data_dir: temp_dir.path().to_string_lossy().into_owned(), ..Config::default() };
        let store = Store::open(config).expect("failed to open store");

        store
            .create_table(
                "widgets",
                KeyAttribute { name: "id".into(), scalar_type: ScalarType::String },
                None,
                "2026-01-01T00:00:00Z".into(),
            )
            .expect("failed to create table");
        store.delete_table("widgets").expect("failed to delete table");

        assert!(matches!(store.describe_table("widgets"), Err(StoreError::ResourceNotFound(_))));
    }
}
