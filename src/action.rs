use thiserror::Error;

use crate::model::group::Solution;

pub type Index = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub group_index: Index,
    pub member_index: Index,
}

impl Position {
    pub fn new(group_index: Index, member_index: Index) -> Position {
        Position { group_index, member_index }
    }
}

/// Membership edits a solution accepts once it has been built.
///
/// Both keep the partition intact: a swap exchanges two placed members and an
/// insert places a member that no group holds yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Swap(Position, Position),
    Insert { member: Index, group_index: Index },
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Invalid position")]
    InvalidPosition,
}

impl Solution {
    pub fn member_at(&self, position: Position) -> Option<Index> {
        self.groups
            .get(position.group_index)?
            .members
            .get(position.member_index)
            .copied()
    }

    pub fn act(&mut self, action: Action) -> Result<(), ActionError> {
        match action {
            Action::Swap(position1, position2) => {
                let member1 = self.member_at(position1).ok_or(ActionError::InvalidPosition)?;
                let member2 = self.member_at(position2).ok_or(ActionError::InvalidPosition)?;
                self.groups[position1.group_index].members[position1.member_index] = member2;
                self.groups[position2.group_index].members[position2.member_index] = member1;
                Ok(())
            }
            Action::Insert { member, group_index } => {
                let group = self.groups.get_mut(group_index).ok_or(ActionError::InvalidPosition)?;
                group.members.push(member);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::group::Group;

    fn sample() -> Solution {
        Solution::new(vec![Group::new(vec![0, 1]), Group::new(vec![2, 3, 4])])
    }

    #[test]
    fn swap_exchanges_members_across_groups() {
        let mut solution = sample();
        solution
            .act(Action::Swap(Position::new(0, 1), Position::new(1, 2)))
            .unwrap();
        assert_eq!(solution.groups[0].members, vec![0, 4]);
        assert_eq!(solution.groups[1].members, vec![2, 3, 1]);
        assert!(solution.check_partition(5).is_ok());
    }

    #[test]
    fn swap_within_one_group() {
        let mut solution = sample();
        solution
            .act(Action::Swap(Position::new(1, 0), Position::new(1, 2)))
            .unwrap();
        assert_eq!(solution.groups[1].members, vec![4, 3, 2]);
    }

    #[test]
    fn invalid_positions_leave_solution_untouched() {
        let mut solution = sample();
        let result = solution.act(Action::Swap(Position::new(0, 0), Position::new(1, 3)));
        assert_eq!(result, Err(ActionError::InvalidPosition));
        assert_eq!(solution, sample());

        let result = solution.act(Action::Insert { member: 5, group_index: 2 });
        assert_eq!(result, Err(ActionError::InvalidPosition));
        assert_eq!(solution, sample());
    }

    #[test]
    fn insert_appends_to_group() {
        let mut solution = sample();
        solution.act(Action::Insert { member: 5, group_index: 0 }).unwrap();
        assert_eq!(solution.groups[0].members, vec![0, 1, 5]);
        assert!(solution.check_partition(6).is_ok());
    }
}
