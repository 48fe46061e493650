use crate::context::Context;
use crate::pipeline::{BoxFuture, Middleware, Next};
use crate::response::Outcome;

/// Sets `x-powered-by` on every response.
#[derive(Clone, Debug)]
pub struct PoweredBy {
    value: String,
}

pub fn powered_by() -> PoweredBy {
    PoweredBy { value: "pipework".to_owned() }
}

impl PoweredBy {
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }
}

impl Middleware for PoweredBy {
    fn name(&self) -> &'static str {
        "poweredBy"
    }

    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let mut response = next.run(ctx).await?;
            response.set_header("x-powered-by", self.value.as_str());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::middleware::testing::{Ok200, run};
    use crate::request::Request;

    #[tokio::test]
    async fn default_and_custom_values() {
        let response = run(powered_by(), Request::new(Method::Get, "/"), Ok200).await.unwrap();
        assert_eq!(response.header("x-powered-by"), Some("pipework"));

        let response = run(powered_by().value("edge"), Request::new(Method::Get, "/"), Ok200).await.unwrap();
        assert_eq!(response.header("X-Powered-By"), Some("edge"));
    }
}
