//! Undo and redo stacks.

use super::{Command, CommandConsumer, CommandError, DoUndo};

#[derive(Default, Debug)]
pub struct CommandManager {
    undo: Vec<Command>,
    redo: Vec<Command>,
}
impl CommandManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Apply a new command and make it the next thing to undo. Clears the redo stack,
    /// handing back what was on it so resources only those commands held can be freed.
    /// A failed command is not recorded.
    pub fn execute<C>(
        &mut self,
        target: &mut C,
        command: Command,
    ) -> Result<Vec<Command>, CommandError>
    where
        C: CommandConsumer<Command> + ?Sized,
    {
        target.apply(DoUndo::Do(&command))?;
        log::trace!("Executed {command:?}");
        self.undo.push(command);
        Ok(std::mem::take(&mut self.redo))
    }
    /// Revert the most recent command. `Ok(None)` if there was nothing to undo.
    /// On error the command stays where it was.
    pub fn undo<C>(&mut self, target: &mut C) -> Result<Option<&Command>, CommandError>
    where
        C: CommandConsumer<Command> + ?Sized,
    {
        let Some(command) = self.undo.pop() else {
            return Ok(None);
        };
        if let Err(err) = target.apply(DoUndo::Undo(&command)) {
            self.undo.push(command);
            return Err(err);
        }
        log::trace!("Undid {command:?}");
        self.redo.push(command);
        Ok(self.redo.last())
    }
    /// Re-apply the most recently undone command. `Ok(None)` if there was nothing to redo.
    pub fn redo<C>(&mut self, target: &mut C) -> Result<Option<&Command>, CommandError>
    where
        C: CommandConsumer<Command> + ?Sized,
    {
        let Some(command) = self.redo.pop() else {
            return Ok(None);
        };
        if let Err(err) = target.apply(DoUndo::Do(&command)) {
            self.redo.push(command);
            return Err(err);
        }
        log::trace!("Redid {command:?}");
        self.undo.push(command);
        Ok(self.undo.last())
    }
    /// Forget all history, returning it oldest first.
    pub fn reset(&mut self) -> Vec<Command> {
        let mut forgotten = std::mem::take(&mut self.undo);
        forgotten.extend(std::mem::take(&mut self.redo).into_iter().rev());
        forgotten
    }
    /// Every command that can still be undone or redone.
    pub fn history(&self) -> impl Iterator<Item = &Command> + '_ {
        self.undo.iter().chain(self.redo.iter())
    }
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}

#[cfg(test)]
mod test {
    use super::CommandManager;
    use crate::commands::{Command, CommandConsumer, CommandError, DoUndo};

    /// Position of a single cursor, moved by `MoveLayer` commands.
    struct Cursor(usize);
    impl CommandConsumer<Command> for Cursor {
        fn apply(&mut self, command: DoUndo<'_, Command>) -> Result<(), CommandError> {
            match command {
                DoUndo::Do(Command::MoveLayer { from, to })
                | DoUndo::Undo(Command::MoveLayer { from: to, to: from }) => {
                    if self.0 != *from {
                        return Err(CommandError::MismatchedState);
                    }
                    self.0 = *to;
                    Ok(())
                }
                _ => Err(CommandError::UnknownResource),
            }
        }
    }
    fn step(from: usize, to: usize) -> Command {
        Command::MoveLayer { from, to }
    }

    #[test]
    fn undo_redo_identity() {
        let mut cursor = Cursor(0);
        let mut manager = CommandManager::new();
        for i in 0..5 {
            manager.execute(&mut cursor, step(i, i + 1)).unwrap();
        }
        assert_eq!(cursor.0, 5);
        for _ in 0..5 {
            assert!(manager.undo(&mut cursor).unwrap().is_some());
        }
        assert_eq!(cursor.0, 0);
        // Empty stack is a no-op, not an error.
        assert!(manager.undo(&mut cursor).unwrap().is_none());
        for _ in 0..5 {
            manager.redo(&mut cursor).unwrap();
        }
        assert_eq!(cursor.0, 5);
        assert!(manager.redo(&mut cursor).unwrap().is_none());
    }
    #[test]
    fn execute_after_undo_clears_redo() {
        let mut cursor = Cursor(0);
        let mut manager = CommandManager::new();
        manager.execute(&mut cursor, step(0, 1)).unwrap();
        manager.execute(&mut cursor, step(1, 2)).unwrap();
        manager.undo(&mut cursor).unwrap();
        assert!(manager.can_redo());
        let dropped = manager.execute(&mut cursor, step(1, 7)).unwrap();
        assert_eq!(dropped, vec![step(1, 2)]);
        assert!(!manager.can_redo());
        assert_eq!(manager.undo_depth(), 2);
        assert_eq!(manager.history().count(), 2);
    }
    #[test]
    fn failures_are_not_recorded() {
        let mut cursor = Cursor(0);
        let mut manager = CommandManager::new();
        assert_eq!(
            manager.execute(&mut cursor, step(3, 4)),
            Err(CommandError::MismatchedState)
        );
        assert!(!manager.can_undo());

        manager.execute(&mut cursor, step(0, 1)).unwrap();
        // Someone moved the cursor behind the manager's back.
        cursor.0 = 9;
        assert_eq!(
            manager.undo(&mut cursor).map(|c| c.cloned()),
            Err(CommandError::MismatchedState)
        );
        assert_eq!(manager.undo_depth(), 1);
        assert_eq!(manager.reset(), vec![step(0, 1)]);
        assert!(!manager.can_undo() && !manager.can_redo());
    }
}
