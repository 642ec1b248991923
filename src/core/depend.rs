//! Dependency injection
//!
//! Handlers declare [`Param`]s. A param either reads a [`Field`] from the
//! request or depends on a [`Provider`] that has params of its own. The
//! [`Resolver`] walks that tree depth-first for one request:
//!
//! - field errors of one level are collected into a single
//!   `ValidationError::FieldErrors`
//! - errors raised by a provider (security failures included) stop resolution
//! - each provider runs at most once per request unless its `Depends` opts
//!   out of caching
//! - nesting deeper than the resolver's limit is a `DependencyError::TooDeep`

use crate::core::error::{
    BindError, BindResult, DependencyError, FieldValidationError, ValidationError,
};
use crate::core::field::Field;
use crate::core::request::RequestAdapter;
use crate::core::validation::validate_model;
use crate::security::SecurityRequirement;
use async_trait::async_trait;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use validator::Validate;

/// Default nesting limit of the resolver
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Something that computes a value from its own resolved params
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Params resolved before [`Provider::provide`] runs
    fn params(&self) -> &[Param];

    async fn provide(&self, args: Arguments) -> BindResult<Value>;

    /// Security requirement this provider adds to every operation using it
    fn security(&self) -> Option<SecurityRequirement> {
        None
    }
}

/// Where a param's value comes from
#[derive(Debug, Clone)]
pub enum Source {
    Field(Field),
    Depends(Depends),
}

/// A named handler or provider argument
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub source: Source,
}

impl Param {
    pub fn field(name: impl Into<String>, field: Field) -> Self {
        Self {
            name: name.into(),
            source: Source::Field(field),
        }
    }

    pub fn depends(name: impl Into<String>, depends: Depends) -> Self {
        Self {
            name: name.into(),
            source: Source::Depends(depends),
        }
    }

    pub fn as_field(&self) -> Option<&Field> {
        match &self.source {
            Source::Field(field) => Some(field),
            Source::Depends(_) => None,
        }
    }
}

/// A dependency on a provider
#[derive(Clone)]
pub struct Depends {
    provider: Arc<dyn Provider>,
    use_cache: bool,
}

impl fmt::Debug for Depends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Depends")
            .field("provider", &self.provider.name())
            .field("use_cache", &self.use_cache)
            .finish()
    }
}

impl Depends {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            use_cache: true,
        }
    }

    /// Depend on an async closure
    ///
    /// ```rust,ignore
    /// let db = Depends::from_fn("db", vec![], |_| async { Ok(json!("pool")) });
    /// ```
    pub fn from_fn<F, Fut>(name: impl Into<String>, params: Vec<Param>, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BindResult<Value>> + Send + 'static,
    {
        Self::new(Arc::new(FnProvider {
            name: name.into(),
            params,
            func: Box::new(move |args| -> BoxFuture<'static, BindResult<Value>> {
                Box::pin(f(args))
            }),
        }))
    }

    /// Run the provider again every time it is needed
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    fn cache_key(&self) -> usize {
        Arc::as_ptr(&self.provider) as *const () as usize
    }
}

type ProviderFn = Box<dyn Fn(Arguments) -> BoxFuture<'static, BindResult<Value>> + Send + Sync>;

struct FnProvider {
    name: String,
    params: Vec<Param>,
    func: ProviderFn,
}

#[async_trait]
impl Provider for FnProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> &[Param] {
        &self.params
    }

    async fn provide(&self, args: Arguments) -> BindResult<Value> {
        (self.func)(args).await
    }
}

/// Resolved arguments, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Arguments {
    values: IndexMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Deserialize the named argument into `T`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> BindResult<T> {
        let value = self.value(name).cloned().ok_or_else(|| missing(name))?;
        convert(name, value)
    }

    /// Remove the named argument and deserialize it into `T`
    pub fn take<T: DeserializeOwned>(&mut self, name: &str) -> BindResult<T> {
        let value = self.values.shift_remove(name).ok_or_else(|| missing(name))?;
        convert(name, value)
    }

    /// Deserialize the named argument into `T` and run its validation rules
    pub fn model<T: DeserializeOwned + Validate>(&self, name: &str) -> BindResult<T> {
        let value = self.value(name).cloned().ok_or_else(|| missing(name))?;
        validate_model(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.values
    }
}

fn missing(name: &str) -> BindError {
    ValidationError::MissingArgument {
        argument: name.to_string(),
    }
    .into()
}

fn convert<T: DeserializeOwned>(name: &str, value: Value) -> BindResult<T> {
    serde_json::from_value(value).map_err(|e| {
        DependencyError::Deserialize {
            argument: name.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Per-request dependency resolver
pub struct Resolver<'a> {
    request: &'a dyn RequestAdapter,
    cache: Mutex<HashMap<usize, Value>>,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(request: &'a dyn RequestAdapter) -> Self {
        Self {
            request,
            cache: Mutex::new(HashMap::new()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve `params` against the request
    pub async fn resolve(&self, params: &[Param]) -> BindResult<Arguments> {
        self.resolve_level(params, 0).await
    }

    /// Run dependencies for their side effects only
    pub async fn run_pre_depends(&self, depends: &[Depends]) -> BindResult<()> {
        for dep in depends {
            self.resolve_depends(dep, 1).await?;
        }
        Ok(())
    }

    fn resolve_level<'s>(
        &'s self,
        params: &'s [Param],
        depth: usize,
    ) -> BoxFuture<'s, BindResult<Arguments>> {
        Box::pin(async move {
            let mut args = Arguments::new();
            let mut errors: Vec<FieldValidationError> = Vec::new();

            for param in params {
                match &param.source {
                    Source::Field(field) => match field.extract(&param.name, self.request) {
                        Ok(value) => args.insert(param.name.clone(), value),
                        Err(BindError::Validation(ValidationError::Field(e))) => errors.push(e),
                        Err(BindError::Validation(ValidationError::FieldErrors(es))) => {
                            errors.extend(es)
                        }
                        Err(other) => return Err(other),
                    },
                    Source::Depends(dep) => {
                        // Providers only run on a clean level
                        if !errors.is_empty() {
                            return Err(ValidationError::FieldErrors(errors).into());
                        }
                        let value = self.resolve_depends(dep, depth + 1).await?;
                        args.insert(param.name.clone(), value);
                    }
                }
            }

            if !errors.is_empty() {
                tracing::debug!("{} field error(s) at depth {}", errors.len(), depth);
                return Err(ValidationError::FieldErrors(errors).into());
            }
            Ok(args)
        })
    }

    async fn resolve_depends(&self, dep: &Depends, depth: usize) -> BindResult<Value> {
        let name = dep.provider.name();
        if depth > self.max_depth {
            return Err(DependencyError::TooDeep {
                name: name.to_string(),
                depth,
            }
            .into());
        }

        let key = dep.cache_key();
        if dep.use_cache {
            if let Some(value) = self.cached(key) {
                tracing::debug!("Dependency '{}' served from request cache", name);
                return Ok(value);
            }
        }

        let args = self.resolve_level(dep.provider.params(), depth).await?;
        tracing::debug!("Resolving dependency '{}' ({} args)", name, args.len());
        let value = dep.provider.provide(args).await?;

        if dep.use_cache {
            self.cache().insert(key, value.clone());
        }
        Ok(value)
    }

    fn cached(&self, key: usize) -> Option<Value> {
        self.cache().get(&key).cloned()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<usize, Value>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Dependency cache lock poisoned, reusing its entries");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockRequest;
    use crate::core::error::RequestError;
    use crate::core::field::FieldType;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_dep(counter: Arc<AtomicUsize>) -> Depends {
        Depends::from_fn("counter", vec![], move |_| {
            let counter = counter.clone();
            async move { Ok(json!(counter.fetch_add(1, Ordering::SeqCst))) }
        })
    }

    #[tokio::test]
    async fn test_fields_in_declaration_order() {
        let req = MockRequest::builder()
            .query("b", "2")
            .query("a", "1")
            .build();
        let params = vec![
            Param::field("b", Field::query().of_type(FieldType::Integer)),
            Param::field("a", Field::query().of_type(FieldType::Integer)),
        ];

        let args = Resolver::new(&req).resolve(&params).await.unwrap();
        assert_eq!(args.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(args.get::<i64>("a").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_field_errors_are_collected() {
        let req = MockRequest::builder().query("page", "x").build();
        let params = vec![
            Param::field("page", Field::query().of_type(FieldType::Integer)),
            Param::field("token", Field::header()),
        ];

        let err = Resolver::new(&req).resolve(&params).await.unwrap_err();
        match err {
            BindError::Validation(ValidationError::FieldErrors(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "page");
                assert_eq!(errors[1].field, "token");
            }
            other => panic!("Expected FieldErrors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nested_dependencies() {
        let user = Depends::from_fn(
            "user",
            vec![Param::field("user_id", Field::query().of_type(FieldType::Integer))],
            |args| async move { Ok::<_, BindError>(json!({ "id": args.get::<i64>("user_id")? })) },
        );
        let greeting = Depends::from_fn(
            "greeting",
            vec![Param::depends("user", user)],
            |args| async move {
                let user: Value = args.get("user")?;
                Ok::<_, BindError>(json!(format!("hello #{}", user["id"])))
            },
        );

        let req = MockRequest::builder().query("user_id", "7").build();
        let args = Resolver::new(&req)
            .resolve(&[Param::depends("greeting", greeting)])
            .await
            .unwrap();
        assert_eq!(args.get::<String>("greeting").unwrap(), "hello #7");
    }

    #[tokio::test]
    async fn test_cache_per_request() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dep = counter_dep(counter.clone());
        let params = vec![
            Param::depends("first", dep.clone()),
            Param::depends("second", dep),
        ];
        let req = MockRequest::builder().build();

        let args = Resolver::new(&req).resolve(&params).await.unwrap();
        assert_eq!(args.get::<usize>("first").unwrap(), 0);
        assert_eq!(args.get::<usize>("second").unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // A new request starts with an empty cache
        Resolver::new(&req).resolve(&params).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_survives_poisoned_lock() {
        let counter = Arc::new(AtomicUsize::new(0));
        let params = vec![Param::depends("first", counter_dep(counter.clone()))];
        let req = MockRequest::builder().build();
        let resolver = Resolver::new(&req);

        resolver.resolve(&params).await.unwrap();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = resolver.cache.lock();
            panic!("poison the cache");
        }));
        assert!(resolver.cache.is_poisoned());

        let args = resolver.resolve(&params).await.unwrap();
        assert_eq!(args.get::<usize>("first").unwrap(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_cache() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dep = counter_dep(counter.clone()).no_cache();
        let params = vec![
            Param::depends("first", dep.clone()),
            Param::depends("second", dep),
        ];
        let req = MockRequest::builder().build();

        let args = Resolver::new(&req).resolve(&params).await.unwrap();
        assert_eq!(args.get::<usize>("second").unwrap(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_error_short_circuits() {
        let counter = Arc::new(AtomicUsize::new(0));
        let failing = Depends::from_fn("guard", vec![], |_| async {
            Err::<Value, BindError>(
                RequestError::Forbidden {
                    message: "nope".to_string(),
                }
                .into(),
            )
        });
        let params = vec![
            Param::depends("guard", failing),
            Param::depends("after", counter_dep(counter.clone())),
        ];
        let req = MockRequest::builder().build();

        let err = Resolver::new(&req).resolve(&params).await.unwrap_err();
        assert!(matches!(err, BindError::Request(RequestError::Forbidden { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let mut dep = Depends::from_fn("leaf", vec![], |_| async { Ok(Value::Null) });
        for i in 0..4 {
            dep = Depends::from_fn(
                format!("level{}", i),
                vec![Param::depends("inner", dep)],
                |_| async { Ok(Value::Null) },
            );
        }
        let req = MockRequest::builder().build();

        let err = Resolver::new(&req)
            .with_max_depth(3)
            .resolve(&[Param::depends("top", dep)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BindError::Dependency(DependencyError::TooDeep { depth: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_pre_depends_run_first() {
        let counter = Arc::new(AtomicUsize::new(0));
        let req = MockRequest::builder().build();
        let resolver = Resolver::new(&req);
        resolver
            .run_pre_depends(&[counter_dep(counter.clone())])
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_arguments_typed_access() {
        let mut args = Arguments::new();
        args.insert("n", json!(3));
        assert_eq!(args.get::<u8>("n").unwrap(), 3);
        assert!(matches!(
            args.get::<String>("n"),
            Err(BindError::Dependency(DependencyError::Deserialize { .. }))
        ));
        assert!(matches!(
            args.get::<u8>("missing"),
            Err(BindError::Validation(ValidationError::MissingArgument { .. }))
        ));
        assert_eq!(args.take::<u8>("n").unwrap(), 3);
        assert!(args.is_empty());
    }
}
