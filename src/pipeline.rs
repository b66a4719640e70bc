use crate::command::{Command, CommandId};
use crate::error::PorterError;
use crate::format::Framework;

/// The full command graph for one source-framework conversion scenario.
///
/// Commands live in an arena and reference their dependencies by index, so
/// the graph is explicit: edges can be validated and the executor can derive
/// a deterministic linearization instead of relying on object identity.
/// `add` only accepts edges to commands already in the arena, which makes
/// cycles unrepresentable by construction.
pub struct Pipeline {
    pub name: String,
    pub framework: Framework,
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, framework: Framework) -> Self {
        Self {
            name: name.into(),
            framework,
            commands: Vec::new(),
        }
    }

    /// Insert a command, validating that every declared dependency is
    /// already present. Returns the command's stable id.
    pub fn add(&mut self, command: Command) -> Result<CommandId, PorterError> {
        for dep in &command.requires {
            if dep.index() >= self.commands.len() {
                return Err(PorterError::config(format!(
                    "command {:?} depends on a command that is not in the pipeline",
                    command.name
                )));
            }
        }
        let id = CommandId(self.commands.len());
        self.commands.push(command);
        Ok(id)
    }

    pub fn get(&self, id: CommandId) -> &Command {
        &self.commands[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: CommandId) -> &mut Command {
        &mut self.commands[id.index()]
    }

    pub fn commands(&self) -> impl Iterator<Item = (CommandId, &Command)> {
        self.commands.iter().enumerate().map(|(i, c)| (CommandId(i), c))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Dependency-respecting linearization (Kahn's algorithm), with ties
    /// broken by insertion order so the walk is deterministic across runs.
    /// Errors on cycles; with `add`-built graphs that cannot happen, but the
    /// executor validates anyway rather than looping forever.
    pub fn execution_order(&self) -> Result<Vec<CommandId>, PorterError> {
        let n = self.commands.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, command) in self.commands.iter().enumerate() {
            in_degree[i] = command.requires.len();
            for dep in &command.requires {
                dependents[dep.index()].push(i);
            }
        }

        // Ready set kept sorted; always take the smallest insertion index.
        let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(&next) = ready.iter().min() {
            ready.retain(|&i| i != next);
            order.push(CommandId(next));
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        if order.len() != n {
            return Err(PorterError::config(format!(
                "pipeline {:?} contains a dependency cycle",
                self.name
            )));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, Execution};
    use crate::context::ExecutionContext;
    use anyhow::Result;

    fn noop(_: &ExecutionContext) -> Result<Execution> {
        Ok(Execution::Noop)
    }

    fn command(name: &str, requires: Vec<CommandId>) -> Command {
        Command::new(name, CommandKind::Export, noop).requires(requires)
    }

    #[test]
    fn rejects_dangling_dependency() {
        let mut pipeline = Pipeline::new("p", Framework::Onnx);
        let err = pipeline.add(command("a", vec![CommandId(3)])).unwrap_err();
        assert!(matches!(err, PorterError::Config(_)));
    }

    #[test]
    fn self_dependency_is_unrepresentable() {
        let mut pipeline = Pipeline::new("p", Framework::Onnx);
        // The id a command would get is its insertion index, which is not
        // yet a valid edge target when add() runs.
        let next_id = CommandId(pipeline.len());
        assert!(pipeline.add(command("a", vec![next_id])).is_err());
    }

    #[test]
    fn order_respects_edges_and_breaks_ties_by_insertion() {
        let mut pipeline = Pipeline::new("p", Framework::Onnx);
        let a = pipeline.add(command("a", vec![])).unwrap();
        let b = pipeline.add(command("b", vec![])).unwrap();
        let c = pipeline.add(command("c", vec![b, a])).unwrap();
        let d = pipeline.add(command("d", vec![a])).unwrap();

        let order = pipeline.execution_order().unwrap();
        assert_eq!(order, vec![a, b, c, d]);
    }

    #[test]
    fn order_is_deterministic() {
        let build = || {
            let mut pipeline = Pipeline::new("p", Framework::Onnx);
            let mut roots = Vec::new();
            for i in 0..8 {
                roots.push(pipeline.add(command(&format!("root{i}"), vec![])).unwrap());
            }
            for (i, &root) in roots.iter().enumerate() {
                pipeline
                    .add(command(&format!("leaf{i}"), vec![root]))
                    .unwrap();
            }
            pipeline
        };
        let first = build().execution_order().unwrap();
        let second = build().execution_order().unwrap();
        assert_eq!(first, second);
    }
}
