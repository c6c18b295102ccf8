//! The pipeline driver's command container. Rather than mutating a single
//! `Vec` in place across insertions, every stage here consumes the stream's
//! command list and produces a fresh one — indices used *within* a stage
//! (corner lookups, linkage) are always taken against a container that
//! stage itself is not simultaneously resizing. A stage never needs an
//! index computed before its own pass to stay valid *after* that pass,
//! because each stage fully rebuilds the sequence it hands to the next one.

use crate::command::{Command, Instruction};

#[derive(Debug, Clone, Default)]
pub struct Stream {
    commands: Vec<Command>,
}

impl Stream {
    pub fn new() -> Self {
        Stream { commands: Vec::new() }
    }

    pub fn from_commands(commands: Vec<Command>) -> Self {
        Stream { commands }
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn get(&self, index: usize) -> Option<&Command> {
        self.commands.get(index)
    }

    pub fn commands_mut(&mut self) -> &mut [Command] {
        &mut self.commands
    }

    /// (Re)computes `Movement::linkage` for every segment, resetting the
    /// chain to `(None, None)` across any delay-inducing instruction.
    /// Transparent (non-delay) instructions are skipped when finding a
    /// movement's motion-run neighbor.
    pub fn link(&mut self) {
        let n = self.commands.len();
        let mut prev_of: Vec<Option<usize>> = vec![None; n];
        let mut next_of: Vec<Option<usize>> = vec![None; n];
        let mut running_prev: Option<usize> = None;

        for (i, command) in self.commands.iter().enumerate() {
            match command {
                Command::Instruction(instr) => {
                    if instr.is_delay_inducing() {
                        running_prev = None;
                    }
                }
                Command::Movement(_) => {
                    prev_of[i] = running_prev;
                    if let Some(p) = running_prev {
                        next_of[p] = Some(i);
                    }
                    running_prev = Some(i);
                }
            }
        }

        for (i, command) in self.commands.iter_mut().enumerate() {
            if let Command::Movement(m) = command {
                m.linkage.prev = prev_of[i];
                m.linkage.next = next_of[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Movement, MovementKind};
    use crate::vector3::Vector3;

    fn travel(x0: f64, x1: f64) -> Command {
        Command::Movement(Movement::new(
            MovementKind::Travel,
            Vector3::new(x0, 0.0, 0.0),
            Vector3::new(x1, 0.0, 0.0),
            1200.0,
        ))
    }

    #[test]
    fn link_chains_adjacent_movements() {
        let mut s = Stream::new();
        s.push(travel(0.0, 10.0));
        s.push(travel(10.0, 20.0));
        s.link();
        let m0 = s.get(0).unwrap().as_movement().unwrap();
        let m1 = s.get(1).unwrap().as_movement().unwrap();
        assert_eq!(m0.linkage.next, Some(1));
        assert_eq!(m1.linkage.prev, Some(0));
        assert_eq!(m0.linkage.prev, None);
        assert_eq!(m1.linkage.next, None);
    }

    #[test]
    fn link_breaks_across_delay() {
        let mut s = Stream::new();
        s.push(travel(0.0, 10.0));
        s.push(Command::Instruction(Instruction::Home { x: true, y: true, z: true }));
        s.push(travel(10.0, 20.0));
        s.link();
        let m0 = s.get(0).unwrap().as_movement().unwrap();
        let m1 = s.get(2).unwrap().as_movement().unwrap();
        assert_eq!(m0.linkage.next, None);
        assert_eq!(m1.linkage.prev, None);
    }
}
