//! Callback adapter for terminal operations
//!
//! Every terminal operation is a future. [`OnComplete::on_complete`] spawns
//! it on the tokio runtime and hands the result to a callback exactly once.

use std::future::Future;

use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::error::ModelResult;

pub trait OnComplete<T>: Future<Output = ModelResult<T>> + Send + Sized + 'static
where
    T: Send + 'static,
{
    /// Run to completion in the background, then call `callback` with the result
    fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(ModelResult<T>) + Send + 'static,
    {
        tokio::spawn(self.map(callback))
    }
}

impl<T, Fut> OnComplete<T> for Fut
where
    T: Send + 'static,
    Fut: Future<Output = ModelResult<T>> + Send + 'static,
{
}
