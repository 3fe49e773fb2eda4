//! The currently running test, carried as task-local state.
//!
//! A test body runs inside [`TestContext::scope`], which also enters a
//! `test` tracing span so every log line it emits is attributed to it.
//! Background work started with [`spawn`] inherits both.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::worker::WorkerId;

tokio::task_local! {
	static CURRENT_TEST: TestContext;
}

/// Identity of one running test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestContext {
	name: Arc<str>,
	worker: WorkerId,
}

impl TestContext {
	pub fn new(name: impl Into<Arc<str>>, worker: WorkerId) -> Self {
		Self {
			name: name.into(),
			worker,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn worker(&self) -> &WorkerId {
		&self.worker
	}

	/// Runs `fut` with `self` as the current test.
	///
	/// The context ends with the future; nothing outlives it.
	pub async fn scope<F: Future>(self, fut: F) -> F::Output {
		let span = tracing::info_span!(target: "uitest", "test", name = %self.name, worker = %self.worker);
		CURRENT_TEST.scope(self, fut.instrument(span)).await
	}

	/// The test the calling task is running, if any.
	pub fn current() -> Option<TestContext> {
		CURRENT_TEST.try_with(Clone::clone).ok()
	}

	pub fn current_name() -> Option<String> {
		CURRENT_TEST.try_with(|ctx| ctx.name.to_string()).ok()
	}
}

/// Spawns `fut` with the caller's test context and tracing span.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let span = tracing::Span::current();
	match TestContext::current() {
		Some(ctx) => tokio::spawn(CURRENT_TEST.scope(ctx, fut).instrument(span)),
		None => tokio::spawn(fut.instrument(span)),
	}
}
