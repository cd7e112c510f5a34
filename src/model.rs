pub mod entity {
    use serde::{Deserialize, Deserializer, Serialize};

    pub type Id = String;
    pub type Score = f64;

    /// Scale a raw criterion value was recorded on.
    ///
    /// Every known scale is normalized onto 0-100 before summing. Scales this
    /// crate does not recognize are kept verbatim and contribute nothing to
    /// [`Participant::score`].
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "String", into = "String")]
    pub enum ScaleKind {
        /// `"0-1"`
        Unit,
        /// `"0-10"`
        Ten,
        /// `"0-100"`
        Hundred,
        Other(String),
    }

    impl ScaleKind {
        pub fn as_str(&self) -> &str {
            match self {
                ScaleKind::Unit => "0-1",
                ScaleKind::Ten => "0-10",
                ScaleKind::Hundred => "0-100",
                ScaleKind::Other(kind) => kind,
            }
        }

        pub fn normalize(&self, value: f64) -> Score {
            match self {
                ScaleKind::Unit => value * 100.0,
                ScaleKind::Ten => value * 10.0,
                ScaleKind::Hundred => value,
                ScaleKind::Other(_) => 0.0,
            }
        }
    }

    impl From<&str> for ScaleKind {
        fn from(kind: &str) -> Self {
            match kind {
                "0-1" => ScaleKind::Unit,
                "0-10" => ScaleKind::Ten,
                "0-100" => ScaleKind::Hundred,
                other => ScaleKind::Other(other.to_string()),
            }
        }
    }

    impl From<String> for ScaleKind {
        fn from(kind: String) -> Self {
            match kind.as_str() {
                "0-1" => ScaleKind::Unit,
                "0-10" => ScaleKind::Ten,
                "0-100" => ScaleKind::Hundred,
                _ => ScaleKind::Other(kind),
            }
        }
    }

    impl From<ScaleKind> for String {
        fn from(kind: ScaleKind) -> Self {
            match kind {
                ScaleKind::Other(kind) => kind,
                known => known.as_str().to_string(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Criterion {
        #[serde(rename = "type")]
        pub kind: ScaleKind,
        pub value: f64,
    }

    impl Criterion {
        pub fn new(kind: impl Into<ScaleKind>, value: f64) -> Criterion {
            Criterion { kind: kind.into(), value }
        }

        pub fn normalized(&self) -> Score {
            self.kind.normalize(self.value)
        }
    }

    /// A person to be grouped.
    ///
    /// Built once per optimization run from the caller's records and never
    /// mutated afterwards, so the fields are only reachable through getters.
    /// Stored records may carry numeric ids; those are read as their decimal
    /// string form so that `id` and `preferences` share one id space.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Participant {
        #[serde(deserialize_with = "id_from_text_or_number")]
        id: Id,
        #[serde(default)]
        name: String,
        #[serde(default)]
        criteria: Vec<Criterion>,
        #[serde(default, deserialize_with = "ids_from_text_or_number")]
        preferences: Vec<Id>,
    }

    impl Participant {
        pub fn new(id: impl Into<Id>, name: impl Into<String>) -> Participant {
            Participant {
                id: id.into(),
                name: name.into(),
                criteria: Vec::new(),
                preferences: Vec::new(),
            }
        }

        pub fn with_criterion(mut self, kind: impl Into<ScaleKind>, value: f64) -> Participant {
            self.criteria.push(Criterion::new(kind, value));
            self
        }

        pub fn with_preferences<I, T>(mut self, ids: I) -> Participant
        where
            I: IntoIterator<Item = T>,
            T: Into<Id>,
        {
            self.preferences.extend(ids.into_iter().map(Into::into));
            self
        }

        pub fn id(&self) -> &str {
            &self.id
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        pub fn criteria(&self) -> &[Criterion] {
            &self.criteria
        }

        pub fn preferences(&self) -> &[Id] {
            &self.preferences
        }

        /// Sum of all criteria on the common 0-100 scale.
        pub fn score(&self) -> Score {
            self.criteria.iter().map(Criterion::normalized).sum()
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
    }

    impl From<RawId> for Id {
        fn from(raw: RawId) -> Self {
            match raw {
                RawId::Text(text) => text,
                RawId::Integer(number) => number.to_string(),
            }
        }
    }

    fn id_from_text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Id, D::Error> {
        RawId::deserialize(deserializer).map(Id::from)
    }

    fn ids_from_text_or_number<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Id>, D::Error> {
        let raw = Vec::<RawId>::deserialize(deserializer)?;
        Ok(raw.into_iter().map(Id::from).collect())
    }
}


pub mod group {
    use itertools::Itertools;
    use serde::{Deserialize, Serialize};

    use super::entity::{Id, Participant};
    use crate::action::Index;
    use crate::error::{GroupingError, Result};

    /// Members are indices into the participant slice the solution was built from.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Group {
        pub members: Vec<Index>,
    }

    impl Group {
        pub fn new(members: Vec<Index>) -> Group {
            Group { members }
        }

        pub fn len(&self) -> usize {
            self.members.len()
        }

        pub fn is_empty(&self) -> bool {
            self.members.is_empty()
        }
    }

    /// One complete partition of the roster into groups.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Solution {
        pub groups: Vec<Group>,
    }

    impl Solution {
        pub fn new(groups: Vec<Group>) -> Solution {
            Solution { groups }
        }

        pub fn group_count(&self) -> usize {
            self.groups.len()
        }

        pub fn group_sizes(&self) -> Vec<usize> {
            self.groups.iter().map(Group::len).collect()
        }

        /// Index of the group with the fewest members, earliest on ties.
        pub fn smallest_group(&self) -> Option<Index> {
            self.groups.iter().position_min_by_key(|group| group.len())
        }

        /// `membership[participant] == Some(group index)` for every placed participant.
        pub fn membership(&self, n_participants: usize) -> Vec<Option<Index>> {
            let mut membership = vec![None; n_participants];
            for (group_index, group) in self.groups.iter().enumerate() {
                for &member in &group.members {
                    if let Some(slot) = membership.get_mut(member) {
                        *slot = Some(group_index);
                    }
                }
            }
            membership
        }

        /// Checks that every index in `0..n_participants` appears exactly once.
        pub fn check_partition(&self, n_participants: usize) -> Result<()> {
            let mut seen = vec![false; n_participants];
            for &member in self.groups.iter().flat_map(|group| group.members.iter()) {
                match seen.get_mut(member) {
                    None => {
                        return Err(GroupingError::InvariantViolation(format!(
                            "participant index {member} is outside a roster of {n_participants}"
                        )))
                    }
                    Some(true) => {
                        return Err(GroupingError::InvariantViolation(format!(
                            "participant index {member} is placed in more than one group"
                        )))
                    }
                    Some(slot) => *slot = true,
                }
            }
            match seen.iter().position(|placed| !placed) {
                Some(missing) => Err(GroupingError::InvariantViolation(format!(
                    "participant index {missing} is not placed in any group"
                ))),
                None => Ok(()),
            }
        }

        /// Maps member indices back onto the participants they were built from.
        pub fn resolve<'a>(&self, participants: &'a [Participant]) -> Vec<Vec<&'a Participant>> {
            self.groups
                .iter()
                .map(|group| {
                    group.members.iter().filter_map(|&member| participants.get(member)).collect()
                })
                .collect()
        }

        pub fn ids(&self, participants: &[Participant]) -> Vec<Vec<Id>> {
            self.resolve(participants)
                .into_iter()
                .map(|group| group.into_iter().map(|p| p.id().to_string()).collect())
                .collect()
        }
    }
}

pub mod roster {
    use std::collections::HashMap;

    use super::entity::{Participant, Score};
    use crate::action::Index;
    use crate::error::{GroupingError, Result};

    /// Arena over the caller's participants.
    ///
    /// Scores and preference edges are resolved once here so that every
    /// later step works on plain indices.
    #[derive(Debug, Clone)]
    pub struct Roster<'a> {
        participants: &'a [Participant],
        scores: Vec<Score>,
        preferences: Vec<Vec<Index>>,
    }

    impl<'a> Roster<'a> {
        pub fn new(participants: &'a [Participant]) -> Result<Roster<'a>> {
            let mut lookup: HashMap<&str, Index> = HashMap::with_capacity(participants.len());
            for (index, participant) in participants.iter().enumerate() {
                if lookup.insert(participant.id(), index).is_some() {
                    return Err(GroupingError::InvalidArgument(format!(
                        "participant id {:?} appears more than once",
                        participant.id()
                    )));
                }
            }
            // dangling preference ids are dropped
            let preferences = participants
                .iter()
                .map(|participant| {
                    participant
                        .preferences()
                        .iter()
                        .filter_map(|id| lookup.get(id.as_str()).copied())
                        .collect()
                })
                .collect();
            let scores = participants.iter().map(Participant::score).collect();
            Ok(Roster { participants, scores, preferences })
        }

        pub fn len(&self) -> usize {
            self.participants.len()
        }

        pub fn is_empty(&self) -> bool {
            self.participants.is_empty()
        }

        pub fn participants(&self) -> &'a [Participant] {
            self.participants
        }

        pub fn score(&self, index: Index) -> Score {
            self.scores[index]
        }

        pub fn scores(&self) -> &[Score] {
            &self.scores
        }

        /// Resolved preference targets of `index`, in the order they were listed.
        pub fn preferences(&self, index: Index) -> &[Index] {
            &self.preferences[index]
        }
    }
}
