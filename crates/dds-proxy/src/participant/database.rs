// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry of active participants, indexed by id.

use crate::error::{Error, Result};
use crate::participant::Participant;
use crate::types::ParticipantId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Name-indexed registry of the participants the proxy bridges.
///
/// Ids are unique: inserting a second participant under an existing id is an
/// inconsistency error. Reads vastly outnumber writes; participants are only
/// added at construction and removed at teardown.
#[derive(Default)]
pub struct ParticipantsDatabase {
    participants: RwLock<BTreeMap<ParticipantId, Arc<dyn Participant>>>,
}

impl ParticipantsDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant. Fails with an inconsistency error on duplicate id.
    pub fn add_participant(
        &self,
        id: ParticipantId,
        participant: Arc<dyn Participant>,
    ) -> Result<()> {
        let mut participants = self.participants.write();
        if participants.contains_key(&id) {
            return Err(Error::Inconsistency(format!(
                "participant id {id} is duplicated"
            )));
        }
        participants.insert(id, participant);
        Ok(())
    }

    /// Remove a participant, returning it if present.
    pub fn remove_participant(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.participants.write().remove(id)
    }

    pub fn get(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.participants.read().get(id).cloned()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.read().contains_key(id)
    }

    /// Ids of every registered participant, in stable order.
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.participants.read().keys().cloned().collect()
    }

    /// Snapshot of every registered participant, in stable id order.
    pub fn all(&self) -> Vec<(ParticipantId, Arc<dyn Participant>)> {
        self.participants
            .read()
            .iter()
            .map(|(id, participant)| (id.clone(), Arc::clone(participant)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.participants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.read().is_empty()
    }

    /// Remove every participant (shutdown).
    pub fn clear(&self) {
        self.participants.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryDatabase;
    use crate::participant::EchoParticipant;
    use crate::payload::PayloadPool;

    fn echo(id: &str) -> Arc<dyn Participant> {
        EchoParticipant::new(
            ParticipantId::from(id),
            PayloadPool::new(),
            Arc::new(DiscoveryDatabase::new()),
        )
    }

    #[test]
    fn test_add_and_get() {
        let db = ParticipantsDatabase::new();
        db.add_participant(ParticipantId::from("p0"), echo("p0"))
            .expect("add");

        assert!(db.contains(&ParticipantId::from("p0")));
        assert_eq!(db.len(), 1);
        assert_eq!(
            db.get(&ParticipantId::from("p0")).expect("get").id(),
            &ParticipantId::from("p0")
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let db = ParticipantsDatabase::new();
        db.add_participant(ParticipantId::from("p0"), echo("p0"))
            .expect("add");

        let err = db
            .add_participant(ParticipantId::from("p0"), echo("p0"))
            .expect_err("duplicate");
        assert!(matches!(err, Error::Inconsistency(_)));
    }

    #[test]
    fn test_ids_stable_order() {
        let db = ParticipantsDatabase::new();
        db.add_participant(ParticipantId::from("p1"), echo("p1"))
            .expect("add");
        db.add_participant(ParticipantId::from("p0"), echo("p0"))
            .expect("add");

        assert_eq!(
            db.ids(),
            vec![ParticipantId::from("p0"), ParticipantId::from("p1")]
        );
    }
}
