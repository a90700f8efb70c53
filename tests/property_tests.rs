//! Property-based tests for devprov
//!
//! These tests verify:
//! - Retry counts and backoff delays for any policy and failure script
//! - Idempotence of shell block insertion
//! - At most one backup per file per run

mod common;

use common::{RecordingSleeper, SequenceExecutor};
use devprov::command::CommandSpec;
use devprov::config::{parse_backoff_schedule, RetryPolicy};
use devprov::retry::{diagnose_generic, RetryEngine};
use devprov::shellrc::{BlockOutcome, ShellConfigBlock, ShellRcEditor};
use proptest::prelude::*;
use std::time::Duration;

// =============================================================================
// Retry/Backoff Engine
// =============================================================================

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..8, prop::collection::vec(0u64..120, 0..5)).prop_map(|(attempts, schedule)| {
        RetryPolicy::from_secs(attempts, 60, &schedule)
    })
}

/// Delay the engine must wait after failed attempt `attempt` (1-based).
fn expected_delay(schedule: &[Duration], attempt: u32) -> Duration {
    if schedule.is_empty() {
        return Duration::ZERO;
    }
    let index = (attempt as usize - 1).min(schedule.len() - 1);
    schedule[index]
}

proptest! {
    /// A command that always fails runs exactly max_attempts times and
    /// sleeps between attempts only, using the clamped schedule.
    #[test]
    fn always_failing_command_exhausts_policy(policy in policy_strategy(), code in 1i32..255) {
        let executor = SequenceExecutor::new(vec![code; policy.max_attempts as usize]);
        let sleeper = RecordingSleeper::default();
        let engine = RetryEngine::new(&executor, &sleeper);

        let failure = engine
            .execute(&policy, &CommandSpec::new("flaky"), diagnose_generic)
            .expect_err("never succeeds");

        prop_assert_eq!(failure.attempts, policy.max_attempts);
        prop_assert_eq!(failure.last_code, code);
        prop_assert_eq!(executor.attempts(), policy.max_attempts);

        let expected: Vec<Duration> = (1..policy.max_attempts)
            .map(|attempt| expected_delay(&policy.backoff_schedule, attempt))
            .collect();
        prop_assert_eq!(sleeper.delays(), expected);
    }

    /// Success on attempt k stops the engine after k attempts and k-1 waits.
    #[test]
    fn success_stops_retrying(policy in policy_strategy(), k_seed in 0u32..8) {
        let k = k_seed % policy.max_attempts + 1;
        let mut codes = vec![1; (k - 1) as usize];
        codes.push(0);
        let executor = SequenceExecutor::new(codes);
        let sleeper = RecordingSleeper::default();
        let engine = RetryEngine::new(&executor, &sleeper);

        let output = engine
            .execute(&policy, &CommandSpec::new("flaky"), diagnose_generic)
            .expect("succeeds on attempt k");

        prop_assert_eq!(output.exit_code, 0);
        prop_assert_eq!(executor.attempts(), k);
        prop_assert_eq!(sleeper.delays().len() as u32, k - 1);
    }

    /// Any comma-separated list of whole seconds parses in order.
    #[test]
    fn backoff_schedule_parses(secs in prop::collection::vec(0u64..10_000, 1..6)) {
        let raw = secs.iter().map(u64::to_string).collect::<Vec<_>>().join(", ");
        let parsed = parse_backoff_schedule(&raw).expect("valid schedule");
        let expected: Vec<Duration> = secs.into_iter().map(Duration::from_secs).collect();
        prop_assert_eq!(parsed, expected);
    }
}

// =============================================================================
// File-Block Editor
// =============================================================================

fn block_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}"
}

fn content_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-zA-Z0-9_=$\"' ./-]{0,40}", 1..4).prop_map(|lines| lines.join("\n"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Re-adding a block id writes nothing, whatever the new content.
    #[test]
    fn block_insertion_is_idempotent(
        id in block_id_strategy(),
        content in content_strategy(),
        existing in "[a-z# =\n]{0,80}",
        repeats in 2usize..5,
    ) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".bashrc");
        std::fs::write(&path, &existing).expect("seed file");
        let block = ShellConfigBlock::new(id, content);
        let editor = ShellRcEditor::new();

        let first = editor.append_block_if_missing(&path, &block).expect("append");
        prop_assert_eq!(first, BlockOutcome::Appended);
        let after_first = std::fs::read_to_string(&path).expect("read");
        prop_assert!(after_first.starts_with(&existing));

        for round in 1..repeats {
            // Same id, different body: presence of the marker is all that counts.
            let changed = ShellConfigBlock::new(
                block.block_id.clone(),
                format!("{}\necho changed {}", block.content, round),
            );
            let again = editor.append_block_if_missing(&path, &changed).expect("append");
            prop_assert_eq!(again, BlockOutcome::AlreadyPresent);
        }
        let after_all = std::fs::read_to_string(&path).expect("read");
        prop_assert_eq!(&after_all, &after_first);
        prop_assert_eq!(after_all.matches(&block.start_marker()).count(), 1);
    }

    /// However many distinct blocks a run adds, the file is backed up once.
    #[test]
    fn backup_taken_once_per_run(ids in prop::collection::hash_set(block_id_strategy(), 1..6)) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".bashrc");
        std::fs::write(&path, "# original\n").expect("seed file");
        let editor = ShellRcEditor::new();

        for id in &ids {
            let outcome = editor
                .append_block_if_missing(&path, &ShellConfigBlock::new(id.clone(), "true"))
                .expect("append");
            prop_assert_eq!(outcome, BlockOutcome::Appended);
        }

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .expect("list dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".devprov-backup-"))
            .collect();
        prop_assert_eq!(backups.len(), 1);
        let backup = std::fs::read_to_string(backups[0].path()).expect("read backup");
        prop_assert_eq!(backup, "# original\n");
    }
}
