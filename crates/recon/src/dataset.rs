use crate::error::SyncError;
use crate::model::{Entity, EntityKind, Match, Player, PlayerStat, Snapshot, Table, Team, Transfer};
use crate::store::Store;

/// Which of the two five-table sets a [`Dataset`] maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSet {
    /// `teams`, `players`, ... : the synchronized raw tables.
    Raw,
    /// `cleaned_teams`, `cleaned_players`, ... : post-validation tables.
    Cleaned,
}

impl TableSet {
    pub fn table_name(self, kind: EntityKind) -> &'static str {
        match self {
            Self::Raw => kind.table_name(),
            Self::Cleaned => kind.cleaned_table_name(),
        }
    }

    /// Table names in child-first delete order.
    pub fn delete_order(self) -> Vec<&'static str> {
        EntityKind::DELETE_ORDER
            .iter()
            .map(|k| self.table_name(*k))
            .collect()
    }
}

/// All five entity snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub teams: Snapshot<Team>,
    pub players: Snapshot<Player>,
    pub matches: Snapshot<Match>,
    pub player_stats: Snapshot<PlayerStat>,
    pub transfers: Snapshot<Transfer>,
}

impl Dataset {
    pub fn read<S: Store + ?Sized>(store: &S, set: TableSet) -> Result<Self, SyncError> {
        Ok(Self {
            teams: read_snapshot(store, set)?,
            players: read_snapshot(store, set)?,
            matches: read_snapshot(store, set)?,
            player_stats: read_snapshot(store, set)?,
            transfers: read_snapshot(store, set)?,
        })
    }

    /// Encode all five snapshots, in parent-first insert order.
    pub fn to_tables(&self, set: TableSet) -> Result<Vec<Table>, SyncError> {
        Ok(vec![
            self.teams.to_table(set.table_name(EntityKind::Team))?,
            self.players.to_table(set.table_name(EntityKind::Player))?,
            self.matches.to_table(set.table_name(EntityKind::Match))?,
            self.player_stats.to_table(set.table_name(EntityKind::PlayerStat))?,
            self.transfers.to_table(set.table_name(EntityKind::Transfer))?,
        ])
    }

    /// Atomically replace the five tables of `set` with this dataset.
    pub fn persist<S: Store + ?Sized>(&self, store: &mut S, set: TableSet) -> Result<(), SyncError> {
        let tables = self.to_tables(set)?;
        store
            .replace_tables(&set.delete_order(), &tables)
            .map_err(SyncError::Transaction)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Team => self.teams.len(),
            EntityKind::Player => self.players.len(),
            EntityKind::Match => self.matches.len(),
            EntityKind::PlayerStat => self.player_stats.len(),
            EntityKind::Transfer => self.transfers.len(),
        }
    }
}

fn read_snapshot<E: Entity, S: Store + ?Sized>(store: &S, set: TableSet) -> Result<Snapshot<E>, SyncError> {
    let table = store.read_table(set.table_name(E::KIND))?;
    Snapshot::from_table(&table)
}
