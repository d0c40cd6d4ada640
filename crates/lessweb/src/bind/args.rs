use super::{Bindable, Binder, ParamDescriptor, ParamKind};
use crate::error::WebError;

/// The parameter list of a handler, implemented for tuples of [`Bindable`] types.
pub trait BindArgs: Sized + Send {
    fn kinds() -> Vec<ParamKind>;

    /// Binds every parameter in order, the first failure aborts binding.
    fn bind(binder: &mut Binder<'_>, descriptors: &[ParamDescriptor]) -> Result<Self, WebError>;
}

macro_rules! impl_bind_args_for_tuple {
    ($($param:ident)*) => {
        impl<$($param: Bindable,)*> BindArgs for ($($param,)*) {
            fn kinds() -> Vec<ParamKind> {
                vec![$($param::kind(),)*]
            }

            #[allow(unused_variables, unused_mut, non_snake_case)]
            fn bind(binder: &mut Binder<'_>, descriptors: &[ParamDescriptor]) -> Result<Self, WebError> {
                let mut descriptors = descriptors.iter();
                Ok(($(
                    $param::bind(
                        binder,
                        descriptors.next().ok_or_else(|| WebError::fault("fewer descriptors than parameters"))?,
                    )?,
                )*))
            }
        }
    };
}

impl_bind_args_for_tuple! {}
impl_bind_args_for_tuple! { A }
impl_bind_args_for_tuple! { A B }
impl_bind_args_for_tuple! { A B C }
impl_bind_args_for_tuple! { A B C D }
impl_bind_args_for_tuple! { A B C D E }
impl_bind_args_for_tuple! { A B C D E F }
impl_bind_args_for_tuple! { A B C D E F G }
impl_bind_args_for_tuple! { A B C D E F G H }
impl_bind_args_for_tuple! { A B C D E F G H I }
impl_bind_args_for_tuple! { A B C D E F G H I J }
impl_bind_args_for_tuple! { A B C D E F G H I J K }
impl_bind_args_for_tuple! { A B C D E F G H I J K L }
