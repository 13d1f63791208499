use crate::dataset::Dataset;
use crate::model::{Entity, Snapshot};

/// Full-snapshot replace: the union of persisted and incoming where the
/// incoming record wins on a shared key, minus keys the incoming snapshot no
/// longer carries. The result's key set equals the incoming key set.
pub fn synchronize<E: Entity>(persisted: &Snapshot<E>, incoming: &Snapshot<E>) -> Snapshot<E> {
    let mut state = persisted.clone();
    for record in incoming.iter() {
        state.insert(record.clone());
    }
    state.retain(|r| incoming.contains_key(r.key()));
    state
}

pub fn synchronize_all(persisted: &Dataset, incoming: &Dataset) -> Dataset {
    Dataset {
        teams: synchronize(&persisted.teams, &incoming.teams),
        players: synchronize(&persisted.players, &incoming.players),
        matches: synchronize(&persisted.matches, &incoming.matches),
        player_stats: synchronize(&persisted.player_stats, &incoming.player_stats),
        transfers: synchronize(&persisted.transfers, &incoming.transfers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Player;

    fn player(id: i64, name: &str, team: i64) -> Player {
        Player {
            player_id: id,
            team_id: Some(team),
            player_name: Some(name.into()),
            position: None,
            birthdate: None,
            nationality: None,
            contract_until: None,
            market_value: None,
        }
    }

    #[test]
    fn incoming_wins_and_new_keys_are_added() {
        let persisted: Snapshot<Player> = vec![player(1, "A", 10)].into_iter().collect();
        let incoming: Snapshot<Player> = vec![player(1, "A", 20), player(2, "B", 10)].into_iter().collect();

        let synced = synchronize(&persisted, &incoming);
        assert_eq!(synced.into_records(), vec![player(1, "A", 20), player(2, "B", 10)]);
    }

    #[test]
    fn persisted_only_keys_are_dropped() {
        let persisted: Snapshot<Player> = vec![player(1, "A", 10), player(3, "C", 10)].into_iter().collect();
        let incoming: Snapshot<Player> = vec![player(4, "D", 10)].into_iter().collect();

        let synced = synchronize(&persisted, &incoming);
        assert_eq!(synced.keys().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn empty_incoming_empties_the_table() {
        let persisted: Snapshot<Player> = vec![player(1, "A", 10)].into_iter().collect();
        assert!(synchronize(&persisted, &Snapshot::new()).is_empty());
    }
}
