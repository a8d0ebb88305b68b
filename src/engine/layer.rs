//! Tower middleware
//!
//! Wraps any `Service<CallContext>` so its responses are served through the
//! interceptor. The wrapped service is the "next handler": it only runs on a
//! cache miss (read-through) or before eviction (evict).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::{Layer, Service};

use super::CacheInterceptor;
use crate::context::CallContext;
use crate::error::InterceptError;

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, InterceptError<E>>> + Send>>;

// == Read Through ==
/// Layer serving registered read-through operations from the cache.
#[derive(Clone, Debug)]
pub struct ReadThroughLayer {
    interceptor: CacheInterceptor,
}

impl ReadThroughLayer {
    pub fn new(interceptor: CacheInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for ReadThroughLayer {
    type Service = ReadThroughService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ReadThroughService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReadThroughService<S> {
    inner: S,
    interceptor: CacheInterceptor,
}

impl<S> Service<CallContext> for ReadThroughService<S>
where
    S: Service<CallContext> + Clone + Send + 'static,
    S::Response: Serialize + DeserializeOwned + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = InterceptError<S::Error>;
    type Future = BoxFuture<S::Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(InterceptError::Operation)
    }

    fn call(&mut self, ctx: CallContext) -> Self::Future {
        // Take the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();

        Box::pin(async move {
            interceptor
                .cached(&ctx, || inner.call(ctx.clone()))
                .await
        })
    }
}

// == Evict ==
/// Layer applying an operation's registered evictions after it succeeds.
#[derive(Clone, Debug)]
pub struct EvictLayer {
    interceptor: CacheInterceptor,
}

impl EvictLayer {
    pub fn new(interceptor: CacheInterceptor) -> Self {
        Self { interceptor }
    }
}

impl<S> Layer<S> for EvictLayer {
    type Service = EvictService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EvictService {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EvictService<S> {
    inner: S,
    interceptor: CacheInterceptor,
}

impl<S> Service<CallContext> for EvictService<S>
where
    S: Service<CallContext> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = InterceptError<S::Error>;
    type Future = BoxFuture<S::Response, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(InterceptError::Operation)
    }

    fn call(&mut self, ctx: CallContext) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let interceptor = self.interceptor.clone();

        Box::pin(async move {
            interceptor
                .write_then_evict(&ctx, || inner.call(ctx.clone()))
                .await
        })
    }
}
