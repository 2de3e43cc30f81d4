use proptest::prelude::*;
use tempfile::TempDir;
use vigil::reducer::DUPLICATE_REASON;
use vigil::{FalsePositiveReducer, FeedbackHistory, Issue, ScanContext, Severity};

const FILES: &[&str] = &["src/app.js", "src/db.js", "test/app.test.js", "vendor/lib.js"];
const SNIPPETS: &[Option<&str>] = &[
    None,
    Some("el.innerHTML = name"),
    Some("el.textContent = name"),
    Some("const key = process.env.API_KEY"),
    Some("fetch('https://api.example.com')"),
];

fn arb_issue() -> impl Strategy<Value = Issue> {
    (0..FILES.len(), 0..SNIPPETS.len(), 1usize..20, prop::bool::ANY).prop_map(
        |(file, snippet, line, xss)| {
            let kind = if xss { "xss" } else { "sql-injection" };
            let issue = Issue::new(kind, Severity::High, format!("{kind} risk"))
                .in_file(FILES[file])
                .at(line, 1)
                .from_analyzer("security");
            match SNIPPETS[snippet] {
                Some(snippet) => issue.with_snippet(snippet),
                None => issue,
            }
        },
    )
}

fn context() -> ScanContext {
    ScanContext::default()
        .with_test_files(["**/*.test.js"])
        .with_excluded_paths(["vendor"])
}

proptest! {
    #[test]
    fn prop_kept_and_suppressed_partition_input(issues in prop::collection::vec(arb_issue(), 0..40)) {
        let reducer = FalsePositiveReducer::default();
        let reduction = reducer.reduce(issues.clone(), &context(), &FeedbackHistory::new());

        prop_assert_eq!(reduction.issues.len() + reduction.suppressed.len(), issues.len());
        prop_assert_eq!(reduction.stats.total, issues.len());
        prop_assert_eq!(reduction.stats.by_reason.values().sum::<usize>(), reduction.suppressed.len());

        let fingerprints = |list: Vec<&Issue>| {
            let mut prints: Vec<_> = list.into_iter().map(|i| (i.fingerprint(), i.file.clone())).collect();
            prints.sort();
            prints
        };
        let output: Vec<&Issue> = reduction
            .issues
            .iter()
            .chain(reduction.suppressed.iter().map(|s| &s.issue))
            .collect();
        prop_assert_eq!(fingerprints(output), fingerprints(issues.iter().collect()));
    }

    #[test]
    fn prop_confidence_stays_in_unit_interval(issues in prop::collection::vec(arb_issue(), 1..20)) {
        let mut history = FeedbackHistory::new();
        for (i, issue) in issues.iter().enumerate() {
            history.record_feedback(issue, i % 3 == 0);
        }
        let reduction = FalsePositiveReducer::default().reduce(issues, &context(), &history);
        for issue in reduction.issues.iter().chain(reduction.suppressed.iter().map(|s| &s.issue)) {
            prop_assert!((0.0..=1.0).contains(&issue.confidence));
        }
    }

    #[test]
    fn prop_extra_flagging_signal_never_unsuppresses(issue in arb_issue()) {
        let reducer = FalsePositiveReducer::default();
        let history = FeedbackHistory::new();
        let before = reducer.reduce(vec![issue.clone()], &ScanContext::default(), &history);
        let with_context = ScanContext::default().with_test_files([issue.file.clone()]);
        let after = reducer.reduce(vec![issue], &with_context, &history);

        prop_assert_eq!(after.suppressed.len(), 1);
        prop_assert!(before.suppressed.len() <= after.suppressed.len());
    }
}

#[test]
fn test_reason_follows_signal_order() {
    let issue = Issue::new("xss", Severity::High, "xss risk")
        .in_file("test/app.test.js")
        .at(1, 1)
        .from_analyzer("security")
        .with_snippet("const key = process.env.API_KEY");

    let reduction = FalsePositiveReducer::default().reduce(vec![issue], &context(), &FeedbackHistory::new());
    assert_eq!(reduction.suppressed.len(), 1);
    assert!(reduction.suppressed[0].reason.starts_with("noisy pattern"));
    assert_eq!(reduction.stats.by_reason["pattern"], 1);
}

#[test]
fn test_duplicates_suppressed_after_first() {
    let issue = Issue::new("xss", Severity::High, "xss risk")
        .in_file("src/app.js")
        .at(4, 2)
        .from_analyzer("security");
    let reduction = FalsePositiveReducer::default().reduce(
        vec![issue.clone(), issue.clone().with_confidence(0.2), issue],
        &ScanContext::default(),
        &FeedbackHistory::new(),
    );

    assert_eq!(reduction.issues.len(), 1);
    assert_eq!(reduction.suppressed.len(), 2);
    assert!(reduction.suppressed.iter().all(|s| s.reason == DUPLICATE_REASON));
}

#[test]
fn test_history_round_trips_through_disk() {
    let issue = Issue::new("xss", Severity::High, "xss risk")
        .in_file("src/app.js")
        .from_analyzer("security");
    let mut history = FeedbackHistory::new();
    for _ in 0..9 {
        history.record_feedback(&issue, true);
    }
    history.record_feedback(&issue, false);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("feedback.json");
    history.save(&path).unwrap();
    let loaded = FeedbackHistory::load(&path).unwrap();
    assert_eq!(loaded, history);

    let reduction = FalsePositiveReducer::default().reduce(vec![issue], &ScanContext::default(), &loaded);
    assert_eq!(reduction.stats.by_reason["history"], 1);
    assert!((reduction.suppressed[0].issue.confidence - (1.0 - 0.35 * 0.9)).abs() < 1e-9);
}
