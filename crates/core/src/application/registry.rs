// Worker Registry - queue name -> worker factory

use crate::application::worker::RunnableWorker;
use crate::application::workers::WorkerContext;
use crate::domain::{DeclarationError, QueueName, WorkerDeclaration, WorkerKind};
use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Builds a ready-to-setup worker from the shared ports
pub type WorkerFactory = Box<dyn Fn(&WorkerContext) -> Result<Box<dyn RunnableWorker>> + Send + Sync>;

struct Registration {
    kind: WorkerKind,
    factory: WorkerFactory,
}

/// Catalog of the workers known to this process.
///
/// Each queue name has at most one worker. Registration happens through
/// explicit `register` calls (see `register_builtin_workers`), so the set of
/// queues can be inspected and tested without running anything.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<QueueName, Registration>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the worker responsible for `queue_name`.
    ///
    /// # Errors
    /// - `DeclarationError::DuplicateRegistration` if the queue already has a worker
    /// - `DeclarationError::MissingQueueName` / `InvalidQueueName` for a bad name
    pub fn register<F>(
        &mut self,
        queue_name: &str,
        kind: WorkerKind,
        factory: F,
    ) -> std::result::Result<(), DeclarationError>
    where
        F: Fn(&WorkerContext) -> Result<Box<dyn RunnableWorker>> + Send + Sync + 'static,
    {
        let queue = QueueName::parse(queue_name)?;
        if self.workers.contains_key(&queue) {
            return Err(DeclarationError::DuplicateRegistration(queue.to_string()));
        }

        debug!(queue = %queue, kind = %kind, "Registering worker");
        self.workers.insert(
            queue,
            Registration {
                kind,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Registered queue names, sorted, optionally restricted to one kind
    pub fn active_queues(&self, kind: Option<WorkerKind>) -> Vec<QueueName> {
        self.workers
            .iter()
            .filter(|(_, registration)| kind.map_or(true, |k| registration.kind == k))
            .map(|(queue, _)| queue.clone())
            .collect()
    }

    /// Every registration as (queue, kind), sorted by queue name
    pub fn declarations(&self) -> Vec<WorkerDeclaration> {
        self.workers
            .iter()
            .map(|(queue, registration)| WorkerDeclaration {
                queue_name: queue.clone(),
                kind: registration.kind,
            })
            .collect()
    }

    pub fn kind_of(&self, queue_name: &str) -> Option<WorkerKind> {
        let queue = QueueName::parse(queue_name).ok()?;
        self.workers.get(&queue).map(|registration| registration.kind)
    }

    pub fn contains(&self, queue_name: &str) -> bool {
        self.kind_of(queue_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Instantiate the worker registered for `queue_name`
    pub fn build(&self, queue_name: &str, context: &WorkerContext) -> Result<Box<dyn RunnableWorker>> {
        let queue = QueueName::parse(queue_name)?;
        let registration = self
            .workers
            .get(&queue)
            .ok_or_else(|| AppError::NotFound(format!("No worker registered for queue {}", queue)))?;
        (registration.factory)(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::workers::register_builtin_workers;

    fn unused(_: &WorkerContext) -> Result<Box<dyn RunnableWorker>> {
        Err(AppError::Internal("not built in this test".to_string()))
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = WorkerRegistry::new();
        registry
            .register("test_worker", WorkerKind::Consumer, unused)
            .unwrap();

        let result = registry.register("test_worker", WorkerKind::Loop, unused);
        assert_eq!(
            result,
            Err(DeclarationError::DuplicateRegistration("test_worker".to_string()))
        );
        assert_eq!(registry.kind_of("test_worker"), Some(WorkerKind::Consumer));
    }

    #[test]
    fn test_register_without_name_fails() {
        let mut registry = WorkerRegistry::new();
        let result = registry.register("", WorkerKind::Consumer, unused);
        assert_eq!(result, Err(DeclarationError::MissingQueueName));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_active_queues_filters_by_kind() {
        let mut registry = WorkerRegistry::new();
        registry.register("b_queue", WorkerKind::Consumer, unused).unwrap();
        registry.register("a_queue", WorkerKind::Consumer, unused).unwrap();
        registry.register("batch", WorkerKind::Loop, unused).unwrap();

        let all: Vec<String> = registry
            .active_queues(None)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(all, vec!["a_queue", "b_queue", "batch"]);
        assert_eq!(registry.active_queues(Some(WorkerKind::Loop)).len(), 1);
        assert!(registry.active_queues(Some(WorkerKind::Test)).is_empty());

        let declarations = registry.declarations();
        assert_eq!(declarations.len(), 3);
        assert_eq!(
            declarations[2],
            WorkerDeclaration::new("batch", WorkerKind::Loop).unwrap()
        );
    }

    #[test]
    fn test_builtin_workers() {
        let mut registry = WorkerRegistry::new();
        register_builtin_workers(&mut registry).unwrap();

        assert_eq!(registry.len(), registry.active_queues(None).len());
        assert_eq!(registry.active_queues(Some(WorkerKind::Test)).len(), 1);
        assert_eq!(registry.active_queues(Some(WorkerKind::Loop)).len(), 1);
        assert_eq!(
            registry.kind_of("missedmessage_emails"),
            Some(WorkerKind::Loop)
        );
        assert!(registry.contains("signups"));

        // Declaring the built-ins twice collides on every queue.
        assert!(matches!(
            register_builtin_workers(&mut registry),
            Err(DeclarationError::DuplicateRegistration(_))
        ));
    }
}
