//! Background environment for running [`Task`]s.

use std::{
    error::Error,
    future::{Future, IntoFuture},
    iter,
};

use futures::{
    future::{self, LocalBoxFuture},
    FutureExt as _, TryFutureExt as _,
};
use tokio::task;
use tracing::{self as log, Instrument as _};

#[cfg(doc)]
use crate::Task;

/// Boxed error of a failed [`Task`].
type BoxedError = Box<dyn Error + 'static>;

/// Background environment for running [`Task`]s.
#[derive(Debug, Default)]
pub struct Background {
    /// Local set of tasks.
    set: task::LocalSet,

    /// Handles of spawned tasks, along with their names.
    handles: Vec<(&'static str, task::JoinHandle<Result<(), BoxedError>>)>,
}

impl Background {
    /// Spawns a new named [`Task`] inside the [`Background`] environment.
    ///
    /// The [`Task`] runs inside its own [`tracing::Span`].
    pub fn spawn<F, E>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: Error + 'static,
    {
        let span = log::info_span!("task", task.name = name);
        self.handles.push((
            name,
            self.set.spawn_local(
                future
                    .map_err(|e| BoxedError::from(Box::new(e)))
                    .instrument(span),
            ),
        ));
    }

    /// Returns names of the spawned [`Task`]s.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handles.iter().map(|(name, _)| *name)
    }
}

impl IntoFuture for Background {
    type Output = Result<(), BoxedError>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let Self { set, handles } = self;
        future::try_join_all(iter::once(set.map(Ok).boxed_local()).chain(
            handles.into_iter().map(|(name, h)| {
                h.map(move |r| match r {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        log::error!("`{name}` task failed: {e}");
                        Err(e)
                    }
                    Err(e) => {
                        log::error!("`{name}` task panicked: {e}");
                        Err(BoxedError::from(Box::new(e)))
                    }
                })
                .boxed_local()
            }),
        ))
        .map_ok(drop)
        .boxed_local()
    }
}
