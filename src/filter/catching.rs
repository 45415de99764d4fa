//! Error translation stage: every error coming back from downstream passes
//! through a closure before it reaches the producer.

use crate::attributes::Attributes;
use crate::handler::ContentHandler;
use crate::{Error, Result};

macro_rules! catching {
    ($($method:ident ( $($arg:ident : $ty:ty),* );)+) => {
        $(
            fn $method(&mut self, $($arg: $ty),*) -> Result<()> {
                let result = self.inner.$method($($arg),*);
                result.map_err(|e| (self.on_error)(e))
            }
        )+
    };
}

pub struct ExceptionCatchingFilter<H, F> {
    inner: H,
    on_error: F,
}

inner_access!(ExceptionCatchingFilter<H, F>);

impl<H: ContentHandler, F: FnMut(Error) -> Error> ExceptionCatchingFilter<H, F> {
    /// `on_error` receives each downstream error and returns the one to raise.
    pub fn new(inner: H, on_error: F) -> Self {
        Self { inner, on_error }
    }
}

impl<H: ContentHandler, F: FnMut(Error) -> Error> ContentHandler for ExceptionCatchingFilter<H, F> {
    fn downstream(&mut self) -> Option<&mut dyn ContentHandler> {
        Some(&mut self.inner)
    }

    catching! {
        start_document();
        end_document();
        start_prefix_mapping(prefix: &str, uri: &str);
        end_prefix_mapping(prefix: &str);
        start_element(uri: &str, local_name: &str, qname: &str, attributes: &Attributes);
        end_element(uri: &str, local_name: &str, qname: &str);
        characters(text: &str);
        comment(text: &str);
        start_cdata();
        end_cdata();
        processing_instruction(target: &str, data: &str);
        start_entity(name: &str);
        end_entity(name: &str);
    }
}
