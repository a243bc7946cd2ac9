mod helpers;
mod recovery_tests;
mod shard_tests;
