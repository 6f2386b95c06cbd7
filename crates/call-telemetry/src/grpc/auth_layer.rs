//! Tower layer applying [`CallAuthorizer`] to every gRPC call.
//!
//! tonic's `Interceptor` does not see the request path, so authorization runs
//! as a tower layer on the HTTP/2 request instead. The method is the URI path
//! (`/pkg.Svc/Method`) and the consumer comes from the request headers. Unary
//! and streaming calls are handled identically: one admission per call.
//!
//! ```rust,ignore
//! Server::builder()
//!     .layer(AuthorizeLayer::new(service.authorizer()))
//!     .add_service(BizServer::new(biz))
//!     .add_service(AdminServer::new(admin))
//!     .serve_with_shutdown(addr, token.cancelled())
//!     .await?;
//! ```

use super::authorizer::CallAuthorizer;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::codegen::http;
use tonic::metadata::MetadataMap;
use tonic::transport::server::TcpConnectInfo;
use tower::{Layer, Service};

/// Tower layer for gRPC call authorization.
#[derive(Clone, Debug)]
pub struct AuthorizeLayer {
    authorizer: CallAuthorizer,
}

impl AuthorizeLayer {
    #[must_use]
    pub fn new(authorizer: CallAuthorizer) -> Self {
        Self { authorizer }
    }
}

impl<S> Layer<S> for AuthorizeLayer {
    type Service = AuthorizeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizeService {
            inner,
            authorizer: self.authorizer.clone(),
        }
    }
}

/// Tower service produced by [`AuthorizeLayer`].
#[derive(Clone, Debug)]
pub struct AuthorizeService<S> {
    inner: S,
    authorizer: CallAuthorizer,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for AuthorizeService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        // Keep the instance that was polled ready for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let authorizer = self.authorizer.clone();

        Box::pin(async move {
            let method = req.uri().path().to_string();
            let metadata = MetadataMap::from_headers(req.headers().clone());
            let peer = req
                .extensions()
                .get::<TcpConnectInfo>()
                .and_then(TcpConnectInfo::remote_addr);

            match authorizer.admit(&metadata, &method, peer).await {
                Ok(_) => inner.call(req).await,
                Err(status) => Ok(status.into_http()),
            }
        })
    }
}
