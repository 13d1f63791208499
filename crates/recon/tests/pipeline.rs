use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use rostersync_recon::config::ValidationConfig;
use rostersync_recon::history::{HistoryEntry, Operation};
use rostersync_recon::model::{Player, PlayerStat, Snapshot, Transfer};
use rostersync_recon::report::ViolationKind;
use rostersync_recon::validate::{Quarantined, PLAYER_FK_REASON};
use rostersync_recon::{run_at, Dataset, EntityKind, Extracts, MemoryStore, Store, SyncError, TableSet};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
}

fn extracts_with_players(players: &str) -> Extracts {
    Extracts::from_csv(
        &fixture("teams.csv"),
        &fixture(players),
        &fixture("matches.csv"),
        &fixture("player_stats.csv"),
        &fixture("transfers.csv"),
    )
    .unwrap()
}

fn extracts() -> Extracts {
    extracts_with_players("players.csv")
}

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn limits() -> ValidationConfig {
    ValidationConfig::default()
}

// -------------------------------------------------------------------------
// Single run
// -------------------------------------------------------------------------

#[test]
fn first_run_inserts_without_history() {
    let mut store = MemoryStore::new();
    let outcome = run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();

    assert_eq!(store.read_table("players").unwrap().len(), 5);
    assert!(store.read_table("players_history").unwrap().is_empty());
    assert_eq!(outcome.report.history.updated, 0);
    assert_eq!(outcome.report.history.deleted, 0);
}

#[test]
fn orphans_are_quarantined_before_raw_persist() {
    let mut store = MemoryStore::new();
    let outcome = run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();

    let raw = Dataset::read(&store, TableSet::Raw).unwrap();
    assert!(!raw.transfers.contains_key(4));
    assert!(!raw.player_stats.contains_key(5));

    let transfer_errors = store.read_table("transfer_history_errors").unwrap();
    assert_eq!(transfer_errors.len(), 1);
    assert_eq!(
        transfer_errors.column_values("reason"),
        vec![&rostersync_recon::Value::Text(PLAYER_FK_REASON.into())]
    );

    let referential: Vec<_> = outcome
        .report
        .entries
        .iter()
        .filter(|e| e.kind == ViolationKind::ReferentialViolation)
        .map(|e| (e.table.as_str(), e.row_id))
        .collect();
    assert_eq!(referential, vec![("Player Transfers", 4), ("Player Stats", 5)]);
}

#[test]
fn stat_errors_keep_referential_rows_then_domain_rows() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();

    let errors: Vec<Quarantined<PlayerStat>> =
        store.read_table("player_stats_errors").unwrap().to_records().unwrap();
    let ids: Vec<i64> = errors.iter().map(|q| q.record.stat_id).collect();
    assert_eq!(ids, vec![5, 3, 4, 2]);

    // Quarantined rows keep their pre-correction values
    assert_eq!(errors[2].record.yellow_cards, Some(3));
    assert_eq!(errors[2].reason, "Yellow Cards greater than 2, should be maximum 2");
}

#[test]
fn cleaned_tables_satisfy_card_and_key_rules() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();

    let cleaned = Dataset::read(&store, TableSet::Cleaned).unwrap();
    assert_eq!(cleaned.player_stats.len(), 5);
    for stat in cleaned.player_stats.iter() {
        let red = stat.red_cards.unwrap_or(0);
        let yellow = stat.yellow_cards.unwrap_or(0);
        assert!(red <= 1, "stat {} red {red}", stat.stat_id);
        assert!(yellow <= 2, "stat {} yellow {yellow}", stat.stat_id);
        if yellow == 2 {
            assert_eq!(red, 1, "stat {}", stat.stat_id);
        }
        assert!(cleaned.players.contains_key(stat.player_id.unwrap()));
    }
    for transfer in cleaned.transfers.iter() {
        assert!(cleaned.players.contains_key(transfer.player_id.unwrap()));
    }

    let four = cleaned.player_stats.get(4).unwrap();
    assert_eq!((four.yellow_cards, four.red_cards), (Some(2), Some(1)));
}

#[test]
fn roster_flag_leaves_teams_untouched() {
    let mut store = MemoryStore::new();
    let tight = ValidationConfig {
        max_players_per_team: 1,
    };
    let outcome = run_at(&mut store, &extracts(), &tight, at(1, 9)).unwrap();

    let flagged: Vec<i64> = outcome
        .report
        .entries_for(EntityKind::Team)
        .map(|e| e.row_id)
        .collect();
    assert_eq!(flagged, vec![10, 20]);
    assert_eq!(store.read_table("teams_errors").unwrap().len(), 2);
    assert_eq!(store.read_table("cleaned_teams").unwrap().len(), 3);
}

#[test]
fn record_counts_compare_extract_to_persisted() {
    let mut store = MemoryStore::new();
    let outcome = run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();

    let stats = outcome.report.count_for(EntityKind::PlayerStat).unwrap();
    assert_eq!((stats.before, stats.after), (6, 5));
    let transfers = outcome.report.count_for(EntityKind::Transfer).unwrap();
    assert_eq!((transfers.before, transfers.after), (4, 3));
    let teams = outcome.report.count_for(EntityKind::Team).unwrap();
    assert_eq!((teams.before, teams.after), (3, 3));

    let text = outcome.report.render_text();
    assert!(text.contains("| Player Stats     | 6         | 5         |"), "{text}");
}

#[test]
fn final_view_matches_cleaned_data() {
    let mut store = MemoryStore::new();
    let outcome = run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();

    assert_eq!(store.read_table("final_view").unwrap().len(), 5);
    let view = &outcome.final_view;

    let lacazette = &view[0];
    assert_eq!(lacazette.total_goals, 3);
    assert_eq!(lacazette.estimated_matches_played, "2 match 5 mins");
    assert!(lacazette.scored_3_plus_in_match);
    assert!(lacazette.played_in_france);
    assert_eq!(lacazette.date_joined_french_team, NaiveDate::from_ymd_opt(2022, 7, 1));
    assert!(!lacazette.age_between_25_and_30);

    let cherki = &view[1];
    assert!(cherki.played_in_france);
    assert_eq!(cherki.date_joined_french_team, None);

    let dybala = &view[2];
    assert!(dybala.played_in_italy);
    assert_eq!(dybala.date_joined_italian_team, NaiveDate::from_ymd_opt(2022, 7, 20));
    assert_eq!(dybala.date_joined_french_team, NaiveDate::from_ymd_opt(2020, 1, 15));

    assert!(view[3].age_between_25_and_30);

    let brobbey = &view[4];
    assert_eq!(brobbey.total_goals, 0);
    assert_eq!(brobbey.estimated_matches_played, "0 match 0 mins");
}

// -------------------------------------------------------------------------
// Across runs
// -------------------------------------------------------------------------

#[test]
fn rerun_with_same_extracts_is_idempotent() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();
    let raw_after_first = Dataset::read(&store, TableSet::Raw).unwrap();
    let cleaned_after_first = Dataset::read(&store, TableSet::Cleaned).unwrap();

    let outcome = run_at(&mut store, &extracts(), &limits(), at(1, 10)).unwrap();

    assert_eq!(outcome.report.history.updated, 0);
    assert_eq!(outcome.report.history.deleted, 0);
    assert!(store.read_table("players_history").unwrap().is_empty());
    assert_eq!(Dataset::read(&store, TableSet::Raw).unwrap(), raw_after_first);
    assert_eq!(Dataset::read(&store, TableSet::Cleaned).unwrap(), cleaned_after_first);
}

#[test]
fn changed_players_land_in_history_with_old_values() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();
    let outcome = run_at(&mut store, &extracts_with_players("players_v2.csv"), &limits(), at(2, 9)).unwrap();

    assert_eq!(outcome.report.history.updated, 1);
    assert_eq!(outcome.report.history.deleted, 1);

    let history: Vec<HistoryEntry<Player>> =
        store.read_table("players_history").unwrap().to_records().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].operation, Operation::Deleted);
    assert_eq!(history[0].record.player_id, 5);
    assert_eq!(history[1].operation, Operation::Updated);
    assert_eq!(history[1].record.player_id, 1);
    assert_eq!(history[1].record.team_id, Some(10));
    assert!(history.iter().all(|h| h.timestamp == "2026-05-02 09:00:00"));

    let players: Snapshot<Player> = Snapshot::from_table(&store.read_table("players").unwrap()).unwrap();
    assert_eq!(players.keys().collect::<Vec<_>>(), vec![1, 2, 3, 4, 6]);
    assert_eq!(players.get(1).unwrap().team_id, Some(20));
}

#[test]
fn history_accumulates_across_runs() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();
    run_at(&mut store, &extracts_with_players("players_v2.csv"), &limits(), at(2, 9)).unwrap();
    run_at(&mut store, &extracts(), &limits(), at(3, 9)).unwrap();

    let history: Vec<HistoryEntry<Player>> =
        store.read_table("players_history").unwrap().to_records().unwrap();
    let stamps: Vec<(&str, i64)> = history
        .iter()
        .map(|h| (h.timestamp.as_str(), h.record.player_id))
        .collect();
    assert_eq!(
        stamps,
        vec![
            ("2026-05-02 09:00:00", 5),
            ("2026-05-02 09:00:00", 1),
            ("2026-05-03 09:00:00", 6),
            ("2026-05-03 09:00:00", 1),
        ]
    );
}

// -------------------------------------------------------------------------
// Failure paths
// -------------------------------------------------------------------------

#[test]
fn audit_failure_aborts_before_any_state_change() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();
    let before = Dataset::read(&store, TableSet::Raw).unwrap();

    store.fail_writes_to("players_history");
    let err = run_at(&mut store, &extracts_with_players("players_v2.csv"), &limits(), at(2, 9)).unwrap_err();

    assert!(matches!(err, SyncError::AuditWrite(_)), "{err}");
    assert_eq!(Dataset::read(&store, TableSet::Raw).unwrap(), before);
}

#[test]
fn transaction_failure_rolls_back_and_skips_validation() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();
    let raw_before = Dataset::read(&store, TableSet::Raw).unwrap();
    let cleaned_before = Dataset::read(&store, TableSet::Cleaned).unwrap();
    let view_before = store.read_table("final_view").unwrap();

    // One table of the raw set refuses writes
    store.fail_writes_to("transfer_history");
    let err = run_at(&mut store, &extracts_with_players("players_v2.csv"), &limits(), at(2, 9)).unwrap_err();

    assert!(matches!(err, SyncError::Transaction(_)), "{err}");
    assert_eq!(Dataset::read(&store, TableSet::Raw).unwrap(), raw_before);
    assert_eq!(Dataset::read(&store, TableSet::Cleaned).unwrap(), cleaned_before);
    assert_eq!(store.read_table("final_view").unwrap(), view_before);
}

#[test]
fn rolled_back_run_leaves_error_sinks_alone() {
    let mut store = MemoryStore::new();
    run_at(&mut store, &extracts(), &limits(), at(1, 9)).unwrap();
    let transfer_errors = store.read_table("transfer_history_errors").unwrap();
    let stat_errors = store.read_table("player_stats_errors").unwrap();

    let mut next = extracts();
    next.transfers.push(Transfer {
        trans_id: 50,
        player_id: Some(4242),
        from_team_id: Some(10),
        to_team_id: Some(20),
        trans_date: NaiveDate::from_ymd_opt(2026, 1, 5),
        trans_fee: Some(250000.0),
        contract_duration: Some(2),
    });
    store.fail_writes_to("teams");
    let err = run_at(&mut store, &next, &limits(), at(2, 9)).unwrap_err();

    assert!(matches!(err, SyncError::Transaction(_)), "{err}");
    assert_eq!(store.read_table("transfer_history_errors").unwrap(), transfer_errors);
    assert_eq!(store.read_table("player_stats_errors").unwrap(), stat_errors);
    assert_eq!(stat_errors.len(), 4);
}

#[test]
fn recovers_after_failure_is_cleared() {
    let mut store = MemoryStore::new();
    store.fail_writes_to("cleaned_players");
    assert!(run_at(&mut store, &extracts(), &limits(), at(1, 9)).is_err());
    assert!(store.read_table("cleaned_players").unwrap().is_empty());

    store.clear_failures();
    run_at(&mut store, &extracts(), &limits(), at(1, 10)).unwrap();
    assert_eq!(store.read_table("cleaned_players").unwrap().len(), 5);
}
