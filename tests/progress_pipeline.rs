use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use sortquest::content::{Catalog, ModuleDefinition};
use sortquest::remote::{AggregateBackend, AggregateKey, LocalBackend};
use sortquest::service::commit::commit_results;
use sortquest::service::debounce::{Debouncer, ManualClock};
use sortquest::service::{BatchCommit, CommitReport, HistoryService, Identity, WaitOutcome};
use sortquest::session::result::GameTypeResult;
use sortquest::session::{FlowSequencer, FlowState, ScoreAccumulator, SortingRound};
use sortquest::store::attempts::{GameIdentity, LocalAttemptStore};
use sortquest::store::json_store::JsonStore;
use sortquest::store::ledger::PlacementLedger;
use sortquest::wizard::pipeline::UploadLimits;
use sortquest::wizard::{PendingAttachment, WizardPipeline, WizardView, stages};
use sortquest::ProgressError;

fn identity() -> Identity {
    Identity {
        user_id: "learner-1".into(),
        email: "learner@example.com".into(),
    }
}

fn signed_in_service(backend: Arc<LocalBackend>, store: &JsonStore) -> HistoryService {
    let mut service = HistoryService::new(backend, Duration::from_millis(1000))
        .with_local_fallback(LocalAttemptStore::new(Some(store.clone())));
    service.sign_in(identity());
    service
}

/// Place every term correctly, except `wrong` terms which go to the first
/// other category.
fn play(round: &mut SortingRound, ledger: &mut PlacementLedger, wrong: usize) {
    let moves: Vec<(String, String)> = round
        .terms
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let category = if i < wrong {
                round
                    .categories
                    .iter()
                    .find(|c| c.id != t.correct_category)
                    .map(|c| c.id.clone())
                    .unwrap_or_else(|| t.correct_category.clone())
            } else {
                t.correct_category.clone()
            };
            (t.id.clone(), category)
        })
        .collect();
    for (term, category) in moves {
        round.place_recorded(ledger, &term, &category).unwrap();
    }
}

/// Play every type of the module in flow order and return the annotated
/// results, as the game screen would hand them to the commit step.
fn play_module(
    service: &HistoryService,
    module: &ModuleDefinition,
    ledger: &mut PlacementLedger,
    wrong: usize,
    elapsed: u64,
) -> Vec<GameTypeResult> {
    let mut flow = FlowSequencer::new(module.sequence(), module.requires_continue);
    let mut accumulator = ScoreAccumulator::new();

    while let FlowState::InProgress(game_type) = flow.state() {
        let def = module.game_type(game_type).unwrap();
        let mut round = SortingRound::new(&module.id, def);
        play(&mut round, ledger, wrong);
        assert!(round.is_complete());
        let mut result = round.finish(elapsed);
        service.annotate(&module.id, 1, &mut result);
        accumulator.add(result);

        match flow.complete(game_type).unwrap() {
            FlowState::AwaitingContinue(_) => {
                flow.advance().unwrap();
            }
            FlowState::Complete => break,
            FlowState::InProgress(_) => {}
        }
    }
    assert!(flow.is_complete());
    accumulator.get_all()
}

fn commit(
    service: &Arc<HistoryService>,
    module_id: &str,
    results: Vec<GameTypeResult>,
) -> CommitReport {
    let pending = BatchCommit::spawn(service.clone(), module_id, 1, results);
    match pending.wait(Duration::from_secs(5)) {
        WaitOutcome::Finished(result) => result.unwrap(),
        other => panic!("commit did not finish: {other:?}"),
    }
}

#[test]
fn each_module_run_is_one_history_slot() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
    let backend = Arc::new(LocalBackend::open(store.clone()).unwrap());
    let clock = ManualClock::new();
    let mut service = HistoryService::new(backend.clone(), Duration::from_millis(1000))
        .with_debouncer(Debouncer::with_clock(
            Duration::from_millis(1000),
            Arc::new(clock.clone()),
        ))
        .with_local_fallback(LocalAttemptStore::new(Some(store.clone())));
    service.sign_in(identity());
    let service = Arc::new(service);

    let catalog = Catalog::bundled().unwrap();
    let module = catalog.module("ecosystems").unwrap();
    let types = module.types.len() as u64;
    let mut ledger = PlacementLedger::new(Some(store.clone()));

    let first = play_module(&service, module, &mut ledger, 0, 30);
    assert_eq!(first.len(), module.types.len());
    let report = commit(&service, &module.id, first);
    assert_eq!(report.committed, module.types.len());
    assert_eq!(report.skipped, 0);

    // Second run: one wrong answer per type, and the local best stays put.
    clock.advance(Duration::from_millis(1100));
    let second = play_module(&service, module, &mut ledger, 1, 20);
    assert!(second.iter().all(|r| r.score == 100 && r.current_score < 100));
    let second_total: u64 = second.iter().map(|r| r.current_score).sum();
    commit(&service, &module.id, second);

    let record = service.get_aggregated(&module.id, 1).unwrap().unwrap();
    assert_eq!(record.score, 100 * types + second_total);
    assert_eq!(record.time, 50 * types);
    assert!(record.is_completed);
    let mut expected_modes: Vec<String> =
        module.types.iter().map(|t| t.game_mode_id.clone()).collect();
    expected_modes.sort();
    let mut modes = record.game_mode_ids.clone();
    modes.sort();
    assert_eq!(modes, expected_modes);

    let last = service
        .get_last_three(&module.id, 1, &module.types[0].game_mode_id)
        .unwrap();
    assert_eq!(
        last.scores.as_array(),
        [Some(100 * types + second_total), Some(100 * types), None]
    );
    assert_eq!(last.times.as_array(), [Some(50 * types), Some(30 * types), None]);

    // The aggregate survives a restart of the local backend.
    let reopened = LocalBackend::open(store.clone()).unwrap();
    let key = AggregateKey::new("learner-1", &module.id, 1);
    assert_eq!(reopened.query_aggregate(&key).unwrap(), Some(record));
}

#[test]
fn ledger_rebuilds_a_half_played_board_after_reload() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
    let catalog = Catalog::bundled().unwrap();
    let module = catalog.module("ecosystems").unwrap();
    let def = module.game_type(1).unwrap();

    {
        let mut ledger = PlacementLedger::new(Some(store.clone()));
        let mut round = SortingRound::new(&module.id, def);
        let first = round.terms[0].clone();
        round
            .place_recorded(&mut ledger, &first.id, &first.correct_category)
            .unwrap();
    }

    let ledger = PlacementLedger::new(Some(store));
    let mut round = SortingRound::new(&module.id, def);
    assert_eq!(round.restore(&ledger.list(&round.scope())), 1);
    assert_eq!(round.placed_count(), 1);
    assert!(!round.is_complete());
}

#[test]
fn offline_submit_keeps_local_best_and_allows_retry() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
    let backend = Arc::new(LocalBackend::open(store.clone()).unwrap());
    let service = signed_in_service(backend.clone(), &store);

    let catalog = Catalog::bundled().unwrap();
    let module = catalog.module("grammar").unwrap();
    let def = &module.types[0];
    let mut round = SortingRound::new(&module.id, def);
    let mut ledger = PlacementLedger::in_memory();
    play(&mut round, &mut ledger, 1);
    let result = round.finish(12);

    backend.set_offline(true);
    let results = vec![result.clone()];
    let err = commit_results(&service, &module.id, 1, &results).unwrap_err();
    assert!(matches!(err, ProgressError::RemoteOperationFailed(_)));

    let best = service
        .local_best(&GameIdentity::new(&module.id, &def.game_mode_id, 1))
        .unwrap();
    assert_eq!(best.best_score, result.current_score);
    assert_eq!(best.attempts, 1);

    // The failed call released its debounce slot, so the retry goes through.
    backend.set_offline(false);
    let report = commit_results(&service, &module.id, 1, &results).unwrap();
    assert_eq!(report.committed, 1);
    assert_eq!(report.record.unwrap().score, result.current_score);
}

#[test]
fn wizard_resumes_from_disk_and_completes_with_attachment() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
    let who = identity();

    {
        let backend = Arc::new(LocalBackend::open(store.clone()).unwrap());
        let mut wizard = WizardPipeline::resume(
            backend,
            Some(&who),
            UploadLimits::default(),
            Some(store.clone()),
        )
        .unwrap();
        for number in 1..=3 {
            for field in stages::stage(number).unwrap().fields {
                wizard.set_field(field, "notes").unwrap();
            }
            wizard.proceed().unwrap();
        }
        assert_eq!(wizard.view(), WizardView::Stage(4));
    }

    let backend = Arc::new(LocalBackend::open(store.clone()).unwrap());
    let mut wizard =
        WizardPipeline::resume(backend, Some(&who), UploadLimits::default(), Some(store.clone()))
            .unwrap();
    assert_eq!(wizard.view(), WizardView::Stage(4));
    assert_eq!(wizard.progress_percentage(), 37.5);
    assert!(!wizard.restored_from_mirror());

    while let WizardView::Stage(number) = wizard.view() {
        for field in stages::stage(number).unwrap().fields {
            wizard.set_field(field, "notes").unwrap();
        }
        if number == stages::LAST_STAGE {
            wizard
                .attach(PendingAttachment::new("pitch.pdf", b"%PDF-1.4".to_vec()))
                .unwrap();
        }
        wizard.proceed().unwrap();
    }

    assert_eq!(wizard.view(), WizardView::Completed);
    assert_eq!(wizard.progress_percentage(), 100.0);
    let attachment = wizard.attachment().unwrap();
    assert!(dir.path().join(&attachment.storage_path).exists());
}

#[test]
fn wizard_falls_back_to_local_mirror_when_backend_is_down() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
    let backend = Arc::new(LocalBackend::open(store.clone()).unwrap());
    let who = identity();

    let mut wizard = WizardPipeline::resume(
        backend.clone(),
        Some(&who),
        UploadLimits::default(),
        Some(store.clone()),
    )
    .unwrap();
    for field in stages::stage(1).unwrap().fields {
        wizard.set_field(field, "notes").unwrap();
    }
    wizard.proceed().unwrap();

    backend.set_offline(true);
    let offline =
        WizardPipeline::resume(backend.clone(), Some(&who), UploadLimits::default(), Some(store))
            .unwrap();
    assert!(offline.restored_from_mirror());
    assert_eq!(offline.view(), WizardView::Stage(2));

    // Without a mirror there is nothing to show.
    let err = WizardPipeline::resume(backend, Some(&who), UploadLimits::default(), None)
        .err()
        .unwrap();
    assert!(matches!(err, ProgressError::RemoteOperationFailed(_)));
}
