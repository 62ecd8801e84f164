//! Multiversion task generation utilities.
//!
//! # Understanding multiversion task generation
//!
//! In multiversion testing, we want to run a suite against a cluster where some members run
//! the version of MongoDB being tested (`new`) and others run the previous release (`old`).
//!
//! - `version combinations` - A token such as `new-old-new` that describes which version each
//!   member of the cluster runs, in member order.
//! - `suite shape` - Whether the base suite runs against a sharded cluster or a replica set.
//!   The shape decides both the cluster topology the generated suites are forced into and the
//!   version combinations that are tested.

use anyhow::{bail, Result};

use crate::resmoke::resmoke_suite::ResmokeSuiteConfig;

/// Version combinations to test replica set suites against.
pub const REPL_MIXED_VERSION_CONFIGS: &[&str] = &["new-old-new", "new-new-old", "old-new-new"];
/// Version combinations to test sharded cluster suites against.
pub const SHARDED_MIXED_VERSION_CONFIGS: &[&str] = &["new-old-old-new"];
/// Tags of tests that cannot run in a mixed version cluster.
pub const MULTIVERSION_EXCLUDE_TAGS: &[&str] = &["requires_fcv_44", "multiversion_incompatible"];

/// Shard and node-per-shard settings a sharded base suite may already specify.
///
/// Entries are `<num_shards>-<num_rs_nodes_per_shard>`, with unset values replaced by
/// `default`.
pub const ALLOWED_SHARDED_CONFIGS: &[&str] = &["default-2", "2-default", "2-2"];

const MULTIVERSION_REPL_NUM_NODES: usize = 3;
const MULTIVERSION_NUM_SHARDS: usize = 2;
const MULTIVERSION_NUM_RS_NODES_PER_SHARD: usize = 2;
const UNSET_SHARDED_VALUE: &str = "default";

/// Cluster topology a resmoke suite runs against.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SuiteShape {
    /// Suite runs against a `ShardedClusterFixture`.
    Sharded,
    /// Suite runs against a replica set.
    ReplicaSet,
}

impl SuiteShape {
    /// Get the version combinations suites of this shape should be tested against.
    pub fn version_combinations(&self) -> &'static [&'static str] {
        match self {
            SuiteShape::Sharded => SHARDED_MIXED_VERSION_CONFIGS,
            SuiteShape::ReplicaSet => REPL_MIXED_VERSION_CONFIGS,
        }
    }

    /// Update the given suite configuration so it can run in a mixed version cluster.
    ///
    /// Replica set suites always run with 3 nodes replicating in a linear chain. Sharded suites
    /// always run with 2 shards of 2 nodes each.
    ///
    /// # Arguments
    ///
    /// * `suite_config` - Suite configuration to update in place.
    pub fn update_suite_config(&self, suite_config: &mut ResmokeSuiteConfig) -> Result<()> {
        match self {
            SuiteShape::Sharded => update_suite_config_for_multiversion_sharded(suite_config),
            SuiteShape::ReplicaSet => update_suite_config_for_multiversion_replset(suite_config),
        }
    }
}

/// Get the exclude tags for multiversion tasks as a comma-separated string.
pub fn exclude_tags() -> String {
    MULTIVERSION_EXCLUDE_TAGS.join(",")
}

fn update_suite_config_for_multiversion_replset(
    suite_config: &mut ResmokeSuiteConfig,
) -> Result<()> {
    if let Some(fixture) = suite_config.executor.fixture.as_mut() {
        fixture.num_nodes = Some(MULTIVERSION_REPL_NUM_NODES);
        fixture.linear_chain = Some(true);
        Ok(())
    } else {
        bail!("Cannot update a suite without a fixture for multiversion")
    }
}

fn update_suite_config_for_multiversion_sharded(
    suite_config: &mut ResmokeSuiteConfig,
) -> Result<()> {
    let fixture = if let Some(fixture) = suite_config.executor.fixture.as_mut() {
        fixture
    } else {
        bail!("Cannot update a suite without a fixture for multiversion")
    };

    // A value of 0 is the same as not setting the value at all.
    let base_num_shards = fixture.num_shards.filter(|n| *n != 0);
    let base_num_rs_nodes_per_shard = fixture.num_rs_nodes_per_shard.filter(|n| *n != 0);

    if base_num_shards.is_some() || base_num_rs_nodes_per_shard.is_some() {
        let num_shard_num_nodes_pair = format!(
            "{}-{}",
            describe_sharded_value(base_num_shards),
            describe_sharded_value(base_num_rs_nodes_per_shard)
        );
        if !ALLOWED_SHARDED_CONFIGS.contains(&num_shard_num_nodes_pair.as_str()) {
            bail!(
                "The multiversion suite runs sharded clusters with {} shards and {} nodes per shard. \
                 The base suite is configured as '{}'; if this is acceptable, add it to the allowed sharded configurations.",
                MULTIVERSION_NUM_SHARDS,
                MULTIVERSION_NUM_RS_NODES_PER_SHARD,
                num_shard_num_nodes_pair
            );
        }
    }

    fixture.num_shards = Some(MULTIVERSION_NUM_SHARDS);
    fixture.num_rs_nodes_per_shard = Some(MULTIVERSION_NUM_RS_NODES_PER_SHARD);
    Ok(())
}

fn describe_sharded_value(value: Option<usize>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNSET_SHARDED_VALUE.to_string())
}
