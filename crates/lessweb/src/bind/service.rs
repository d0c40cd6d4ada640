use super::{Bindable, Binder, ParamDescriptor, ParamKind};
use crate::error::WebError;
use crate::utils::short_type_name;
use std::ops::Deref;
use std::sync::Arc;

/// A dependency constructed per handler invocation.
///
/// `construct` may bind inputs and ask for other services through the
/// binder. A service is built at most once per invocation, and a service
/// whose construction requires itself fails with
/// [`WebError::ServiceCycle`].
pub trait Service: Send + Sync + Sized + 'static {
    fn construct(binder: &mut Binder<'_>) -> Result<Self, WebError>;
}

/// A handler parameter holding the invocation's instance of service `S`.
#[derive(Debug)]
pub struct Inject<S>(pub Arc<S>);

impl<S> Clone for Inject<S> {
    fn clone(&self) -> Self {
        Inject(Arc::clone(&self.0))
    }
}

impl<S> Deref for Inject<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Service> Bindable for Inject<S> {
    fn kind() -> ParamKind {
        ParamKind::Service(short_type_name::<S>())
    }

    fn bind(binder: &mut Binder<'_>, _desc: &ParamDescriptor) -> Result<Self, WebError> {
        binder.service::<S>().map(Inject)
    }
}
