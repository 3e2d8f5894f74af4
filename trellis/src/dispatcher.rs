//! The per-request dispatch of one endpoint.
//!
//! [`ServiceInvoker`] is the last middleware of every endpoint chain. It
//! negotiates the response language and media type, runs pre-processors,
//! builds the service instance and its arguments, calls the handler and
//! writes the returned value through [`send_value`].

use std::sync::Arc;

use http::StatusCode;
use http::header::{self, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::context::{NextCallback, NextSignal, ServiceContext};
use crate::error::{Error, Result};
use crate::factory::ServiceFactory;
use crate::http::{BoxFuture, Exchange, HttpResponse, Middleware, Next, attachment};
use crate::metadata::{ServiceClass, ServiceMethod};
use crate::params::{Args, ConverterRegistry, process_parameter};
use crate::returns::ServiceReturn;

pub struct ServiceInvoker {
    service: Arc<ServiceClass>,
    method_index: usize,
    factory: Arc<dyn ServiceFactory>,
    converters: Arc<ConverterRegistry>,
}

impl ServiceInvoker {
    pub fn new(
        service: Arc<ServiceClass>,
        method_index: usize,
        factory: Arc<dyn ServiceFactory>,
        converters: Arc<ConverterRegistry>,
    ) -> Self {
        Self {
            service,
            method_index,
            factory,
            converters,
        }
    }

    pub fn service(&self) -> &ServiceClass {
        &self.service
    }

    pub fn method(&self) -> &ServiceMethod {
        &self.service.methods[self.method_index]
    }

    fn ignores_next(&self) -> bool {
        self.method().ignore_next_middlewares || self.service.ignore_next_middlewares
    }

    fn negotiate(&self, exchange: &Exchange) -> Result<(Option<String>, Option<String>)> {
        let method = self.method();
        let request = &exchange.request;

        let language = match &method.resolved_languages {
            Some(declared) => Some(request.accepts_languages(declared).ok_or_else(|| {
                Error::not_acceptable(format!("accepted languages: {}", declared.join(", ")))
            })?),
            None => request.accepted_languages().into_iter().next(),
        };
        let accept = match &method.resolved_accepts {
            Some(declared) => Some(request.accepts(declared).ok_or_else(|| {
                Error::not_acceptable(format!("accepted media types: {}", declared.join(", ")))
            })?),
            None => request.accepted_media_types().into_iter().next(),
        };
        Ok((language, accept))
    }

    async fn dispatch(&self, exchange: &mut Exchange) -> Result<Option<NextSignal>> {
        let method = self.method();
        let trace_id = exchange.context.trace_id.clone();
        debug!(
            trace_id = %trace_id,
            service = self.service.name(),
            method = %method.name,
            "dispatching"
        );

        let (language, accept) = self.negotiate(exchange)?;

        for processor in self.service.pre_processors.iter().chain(&method.pre_processors) {
            processor.process(&mut exchange.request).await?;
        }

        let ctx = ServiceContext {
            request: exchange.request.clone(),
            response: exchange.response.clone(),
            next: NextCallback::new(),
            language,
            accept,
            trace_id,
        };

        let ret = {
            let mut instance = self.factory.create(&self.service, &ctx)?;
            for property in &self.service.properties {
                let value = process_parameter(
                    property.kind,
                    &ctx,
                    property.param_name.as_deref(),
                    &property.param_type,
                    &self.converters,
                )?;
                (property.setter)(instance.as_mut(), value)?;
            }

            let args = method
                .parameters
                .iter()
                .map(|param| {
                    process_parameter(
                        param.kind,
                        &ctx,
                        param.name.as_deref(),
                        &param.param_type,
                        &self.converters,
                    )
                })
                .collect::<Result<Vec<_>>>()?;

            let invoker = method.invoker.as_ref().ok_or_else(|| {
                Error::internal(format!(
                    "no handler declared for {}::{}",
                    self.service.name(),
                    method.name
                ))
            })?;
            invoker(instance.as_mut(), Args::new(args))?
        };

        let response = &exchange.response;
        if !response.headers_sent() {
            if method.resolved_languages.is_some() {
                response.vary("Accept-Language");
                if let Some(language) = &ctx.language {
                    response.set_header_str(header::CONTENT_LANGUAGE, language)?;
                }
            }
            if method.resolved_accepts.is_some() {
                response.vary("Accept");
            }
        }

        send_value(ret, response).await?;
        Ok(ctx.next.take())
    }
}

impl Middleware for ServiceInvoker {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // An earlier endpoint on an overlapping path already answered.
            if exchange.response.headers_sent() {
                return next.run(exchange).await;
            }

            match self.dispatch(exchange).await? {
                Some(NextSignal::Fail(err)) => Err(err),
                Some(NextSignal::Continue) => next.run(exchange).await,
                None if !self.ignores_next() => next.run(exchange).await,
                None => Ok(()),
            }
        })
    }
}

/// Writes a service result to `response`, awaiting deferred values.
pub fn send_value(value: ServiceReturn, response: &HttpResponse) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        match value {
            ServiceReturn::Immediate(value) => send_immediate(value, response),
            ServiceReturn::Empty => {
                if !response.headers_sent() {
                    response.send_status(StatusCode::NO_CONTENT)?;
                }
                Ok(())
            }
            ServiceReturn::Deferred(pending) => {
                let resolved = pending.await?;
                send_value(resolved, response).await
            }
            ServiceReturn::Referenced(resource) => {
                response.set_header_str(header::LOCATION, &resource.location)?;
                match resource.body {
                    Some(body) => {
                        response.set_status(resource.status);
                        send_value(*body, response).await
                    }
                    None => response.send_status(resource.status),
                }
            }
            ServiceReturn::FileDownload(resource) => {
                response.download(&resource.path, &resource.file_name).await
            }
            ServiceReturn::BinaryDownload(data) => {
                response.set_header(
                    header::CONTENT_LENGTH,
                    HeaderValue::from(data.content.len() as u64),
                );
                response.set_header_str(header::CONTENT_TYPE, &data.mime_type)?;
                if let Some(file_name) = &data.file_name {
                    response.set_header_str(header::CONTENT_DISPOSITION, &attachment(file_name))?;
                }
                response.end(data.content)
            }
            ServiceReturn::Suppressed => Ok(()),
        }
    })
}

fn send_immediate(value: Value, response: &HttpResponse) -> Result<()> {
    match value {
        Value::String(text) => response.send_text(text),
        Value::Number(number) => response.send_text(number.to_string()),
        Value::Bool(flag) => response.send_text(flag.to_string()),
        other => response.send_json(&other),
    }
}
