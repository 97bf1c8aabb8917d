//! The contract registry.
//!
//! Owns every contract and orchestrates resolution, matching, validation and
//! synthesis. The in-memory index sits behind a single reader-writer lock:
//! `handle` matches and selects under a shared lock, registration and other
//! mutations take the exclusive lock. Schema resolution, validation and
//! synthesis run outside the lock on compiled snapshots.
//!
//! Every mutation is flushed to the [`ContractStore`]. The flush mutex is taken
//! before the write lock is released, so flushes happen in mutation order.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::matcher::{PathMatcher, PathTemplate, RouteKey, RouteMatch};
use super::openapi;
use super::resolver::SchemaResolver;
use super::synthesizer::ValueSynthesizer;
use super::validator::RequestValidator;
use crate::domain::{
    check_status, Contract, ContractStore, ContractSummary, DeleteScope, HttpMethod, Instance, InstanceOrigin,
    InstancePatch, MockError, MockRequest, MockResponse, RegisterCommand, RegistryState, RequestKind,
    ResponseKind, ResponseSource, SchemaNode, ValueGenerator,
};

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Append handled traffic to the contract as recorded instances
    pub record_traffic: bool,
    /// Recorded instances kept per contract; the oldest are evicted first
    pub max_recorded_instances: usize,
    /// Seed for reproducible synthesis; each draw uses `seed + n`
    pub seed: Option<u64>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            record_traffic: true,
            max_recorded_instances: 50,
            seed: None,
        }
    }
}

#[derive(Debug)]
enum RequestSpec {
    Any,
    Schema(SchemaNode),
    Example(Value),
}

#[derive(Debug)]
enum ResponseSpec {
    Schema(SchemaNode),
    Literal(Value),
}

/// Resolved form of a registered instance, built once per registration
#[derive(Debug)]
struct CompiledInstance {
    request: RequestSpec,
    response: ResponseSpec,
    status: Option<u16>,
}

#[derive(Default)]
struct RegistryIndex {
    matcher: PathMatcher,
    contracts: HashMap<RouteKey, Contract>,
    compiled: HashMap<Uuid, Arc<CompiledInstance>>,
}

impl RegistryIndex {
    /// Contract keys at a template path, optionally narrowed to one method
    fn keys_at(&self, path: &str, method: Option<HttpMethod>) -> Vec<RouteKey> {
        self.matcher
            .keys()
            .filter(|key| key.path == path && method.map_or(true, |m| m == key.method))
            .collect()
    }

    fn locate(&self, path: &str, method: Option<HttpMethod>, id: &Uuid) -> Option<RouteKey> {
        self.keys_at(path, method).into_iter().find(|key| {
            self.contracts
                .get(key)
                .is_some_and(|contract| contract.find_instance(id).is_some())
        })
    }

    fn remove_contract(&mut self, key: &RouteKey) -> Option<Contract> {
        let contract = self.contracts.remove(key)?;
        self.matcher.unregister(key);
        for instance in &contract.instances {
            self.compiled.remove(&instance.id);
        }
        Some(contract)
    }

    /// Serializable state, contracts in registration order
    fn snapshot(&self) -> RegistryState {
        let contracts = self
            .matcher
            .keys()
            .filter_map(|key| self.contracts.get(&key).cloned())
            .collect();
        RegistryState { contracts }
    }
}

/// Result of a delete
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub contracts_removed: usize,
    pub instances_removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedRoute {
    pub path: String,
    pub method: HttpMethod,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRoute {
    pub path: String,
    pub method: HttpMethod,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub registered: Vec<ImportedRoute>,
    pub skipped: Vec<SkippedRoute>,
}

pub struct ContractRegistry {
    index: RwLock<RegistryIndex>,
    store: Arc<dyn ContractStore>,
    flush: Mutex<()>,
    resolver: SchemaResolver,
    synthesizer: ValueSynthesizer,
    generator: Option<Arc<dyn ValueGenerator>>,
    options: RegistryOptions,
    draws: AtomicU64,
}

impl ContractRegistry {
    pub fn new(
        store: Arc<dyn ContractStore>,
        resolver: SchemaResolver,
        synthesizer: ValueSynthesizer,
        options: RegistryOptions,
    ) -> Self {
        Self {
            index: RwLock::new(RegistryIndex::default()),
            store,
            flush: Mutex::new(()),
            resolver,
            synthesizer,
            generator: None,
            options,
            draws: AtomicU64::new(0),
        }
    }

    /// Ask `generator` for schema responses before falling back to synthesis
    pub fn with_generator(mut self, generator: Arc<dyn ValueGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the in-memory state with the store's contents.
    ///
    /// Every stored registered instance is re-resolved; one that no longer
    /// resolves fails the whole load.
    pub async fn load(&self) -> Result<usize, MockError> {
        let state = self.store.load().await?;
        let mut index = RegistryIndex::default();

        for mut contract in state.contracts {
            let key = index.matcher.register(&contract.path, contract.method)?;
            contract.path = key.path.clone();
            for instance in contract.instances.iter().filter(|i| i.is_registered()) {
                let compiled = self.compile(instance)?;
                index.compiled.insert(instance.id, Arc::new(compiled));
            }
            index.contracts.insert(key, contract);
        }

        let count = index.contracts.len();
        *self.index.write().await = index;
        info!(contracts = count, "Loaded contract registry");
        Ok(count)
    }

    /// Register a new instance, creating the contract and its route on first use.
    ///
    /// Distinct instances accumulate under one contract; an instance whose
    /// request and response are identical to an existing one is rejected.
    pub async fn register(&self, command: RegisterCommand) -> Result<Instance, MockError> {
        let path = PathTemplate::parse(&command.path)?.to_string();
        check_status(command.status)?;
        let request_kind = command
            .request_kind
            .unwrap_or_else(|| RequestKind::classify(&command.request));
        let response_kind = command
            .response_kind
            .unwrap_or_else(|| ResponseKind::classify(&command.response));

        let instance = Instance {
            id: Uuid::new_v4(),
            origin: InstanceOrigin::Registered,
            request: command.request,
            response: command.response,
            request_kind,
            response_kind,
            status: command.status,
            definitions: command.definitions,
            params: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: None,
        };
        let compiled = self.compile(&instance)?;

        let mut index = self.index.write().await;
        let key = RouteKey::new(path.clone(), command.method);

        match index.contracts.get_mut(&key) {
            Some(contract) => {
                if let Some(existing) = contract
                    .instances
                    .iter()
                    .find(|i| i.same_content(&instance.request, &instance.response))
                {
                    return Err(MockError::DuplicateInstance {
                        path,
                        method: command.method,
                        existing: existing.id,
                    });
                }
                contract.instances.push(instance.clone());
                contract.updated_at = Some(instance.created_at);
            }
            None => {
                let key = index.matcher.register(&path, command.method)?;
                let mut contract = Contract::new(path.clone(), command.method);
                contract.created_at = instance.created_at;
                contract.instances.push(instance.clone());
                index.contracts.insert(key, contract);
            }
        }
        index.compiled.insert(instance.id, Arc::new(compiled));

        info!(
            path = %path,
            method = %command.method,
            id = %instance.id,
            request_kind = ?instance.request_kind,
            response_kind = ?instance.response_kind,
            "Registered contract instance"
        );
        self.persist(index).await?;
        Ok(instance)
    }

    /// Answer a runtime request.
    pub async fn handle(&self, request: MockRequest) -> Result<MockResponse, MockError> {
        let body = request
            .body
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let (key, bindings, candidates) = {
            let index = self.index.read().await;
            match index.matcher.match_route(&request.path, request.method) {
                RouteMatch::NotFound => {
                    return Err(MockError::NotFound(format!(
                        "no contract for {} {}",
                        request.method, request.path
                    )));
                }
                RouteMatch::MethodNotAllowed { allowed } => {
                    return Err(MockError::MethodNotAllowed {
                        path: request.path.clone(),
                        method: request.method.to_string(),
                        allowed,
                    });
                }
                RouteMatch::Matched { key, bindings } => {
                    let contract = index
                        .contracts
                        .get(&key)
                        .ok_or_else(|| MockError::NotFound(format!("no contract for {} {}", key.method, key.path)))?;
                    let candidates: Vec<(Uuid, Arc<CompiledInstance>)> = contract
                        .registered()
                        .filter_map(|i| index.compiled.get(&i.id).map(|c| (i.id, Arc::clone(c))))
                        .collect();
                    (key, bindings, candidates)
                }
            }
        };

        let (instance_id, compiled) = select_instance(&key, candidates, &body)?;

        let (response_body, source) = match &compiled.response {
            ResponseSpec::Literal(value) => (value.clone(), ResponseSource::Literal),
            ResponseSpec::Schema(node) => self.produce(node).await,
        };
        let status = compiled
            .status
            .unwrap_or_else(|| request.method.default_status());

        debug!(
            path = %key.path,
            method = %key.method,
            instance = %instance_id,
            status,
            source = source.as_str(),
            "Handled request"
        );

        if self.should_record(&request) {
            let mut params = bindings;
            for (name, value) in request.query {
                params.entry(name).or_insert(value);
            }
            self.record(&key, body, response_body.clone(), params).await?;
        }

        Ok(MockResponse {
            status,
            body: response_body,
            source,
        })
    }

    /// Merge-patch one instance. On any error the instance is left unchanged.
    pub async fn update(
        &self,
        path: &str,
        method: Option<HttpMethod>,
        id: Uuid,
        patch: InstancePatch,
    ) -> Result<Instance, MockError> {
        let path = PathTemplate::parse(path)?.to_string();
        check_status(patch.status)?;
        let mut index = self.index.write().await;
        let key = index
            .locate(&path, method, &id)
            .ok_or_else(|| MockError::NotFound(format!("instance {} under {}", id, path)))?;
        let contract = index
            .contracts
            .get(&key)
            .ok_or_else(|| MockError::NotFound(format!("contract {} {}", key.method, key.path)))?;
        let current = contract
            .find_instance(&id)
            .ok_or_else(|| MockError::NotFound(format!("instance {} under {}", id, path)))?;

        let mut updated = current.clone();
        if let Some(request_patch) = &patch.request {
            merge_patch(&mut updated.request, request_patch);
        }
        if let Some(response_patch) = &patch.response {
            merge_patch(&mut updated.response, response_patch);
        }
        updated.request_kind = match patch.request_kind {
            Some(kind) => kind,
            None if patch.request.is_some() => RequestKind::classify(&updated.request),
            None => current.request_kind,
        };
        updated.response_kind = match patch.response_kind {
            Some(kind) => kind,
            None if patch.response.is_some() => ResponseKind::classify(&updated.response),
            None => current.response_kind,
        };
        if patch.status.is_some() {
            updated.status = patch.status;
        }
        if let Some(definitions) = patch.definitions {
            updated.definitions = definitions;
        }

        if let Some(other) = contract
            .instances
            .iter()
            .find(|i| i.id != id && i.same_content(&updated.request, &updated.response))
        {
            return Err(MockError::DuplicateInstance {
                path: key.path.clone(),
                method: key.method,
                existing: other.id,
            });
        }

        let compiled = if updated.is_registered() {
            Some(self.compile(&updated)?)
        } else {
            None
        };

        let now = Utc::now();
        updated.updated_at = Some(now);
        if let Some(contract) = index.contracts.get_mut(&key) {
            if let Some(slot) = contract.instances.iter_mut().find(|i| i.id == id) {
                *slot = updated.clone();
            }
            contract.updated_at = Some(now);
        }
        if let Some(compiled) = compiled {
            index.compiled.insert(id, Arc::new(compiled));
        }

        info!(path = %key.path, method = %key.method, id = %id, "Updated contract instance");
        self.persist(index).await?;
        Ok(updated)
    }

    /// Remove one instance or every contract at a path.
    ///
    /// Removing the last registered instance of a contract removes the whole
    /// contract together with its recorded traffic and its route.
    pub async fn delete(
        &self,
        path: &str,
        method: Option<HttpMethod>,
        scope: DeleteScope,
    ) -> Result<DeleteOutcome, MockError> {
        let path = PathTemplate::parse(path)?.to_string();
        let mut index = self.index.write().await;
        let mut outcome = DeleteOutcome::default();

        match scope {
            DeleteScope::Path => {
                let keys = index.keys_at(&path, method);
                if keys.is_empty() {
                    return Err(MockError::NotFound(format!("no contract at {}", path)));
                }
                for key in keys {
                    if let Some(contract) = index.remove_contract(&key) {
                        outcome.contracts_removed += 1;
                        outcome.instances_removed += contract.instances.len();
                    }
                }
            }
            DeleteScope::Instance(id) => {
                let key = index
                    .locate(&path, method, &id)
                    .ok_or_else(|| MockError::NotFound(format!("instance {} under {}", id, path)))?;
                let cascade = match index.contracts.get_mut(&key) {
                    Some(contract) => {
                        contract.instances.retain(|i| i.id != id);
                        contract.updated_at = Some(Utc::now());
                        contract.registered().next().is_none()
                    }
                    None => false,
                };
                index.compiled.remove(&id);
                outcome.instances_removed = 1;

                if cascade {
                    if let Some(contract) = index.remove_contract(&key) {
                        outcome.contracts_removed = 1;
                        outcome.instances_removed += contract.instances.len();
                        info!(path = %key.path, method = %key.method, "Removed contract after its last instance");
                    }
                }
            }
        }

        info!(
            path = %path,
            contracts = outcome.contracts_removed,
            instances = outcome.instances_removed,
            "Deleted"
        );
        self.persist(index).await?;
        Ok(outcome)
    }

    pub async fn get_instance(
        &self,
        path: &str,
        method: Option<HttpMethod>,
        id: Uuid,
    ) -> Result<Instance, MockError> {
        let path = PathTemplate::parse(path)?.to_string();
        let index = self.index.read().await;
        index
            .locate(&path, method, &id)
            .and_then(|key| index.contracts.get(&key))
            .and_then(|contract| contract.find_instance(&id).cloned())
            .ok_or_else(|| MockError::NotFound(format!("instance {} under {}", id, path)))
    }

    /// Every contract at a template path, with instances
    pub async fn list_instances(
        &self,
        path: &str,
        method: Option<HttpMethod>,
    ) -> Result<Vec<Contract>, MockError> {
        let path = PathTemplate::parse(path)?.to_string();
        let index = self.index.read().await;
        let contracts: Vec<Contract> = index
            .keys_at(&path, method)
            .iter()
            .filter_map(|key| index.contracts.get(key).cloned())
            .collect();
        if contracts.is_empty() {
            return Err(MockError::NotFound(format!("no contract at {}", path)));
        }
        Ok(contracts)
    }

    pub async fn list_contracts(&self) -> Vec<ContractSummary> {
        let index = self.index.read().await;
        index
            .matcher
            .keys()
            .filter_map(|key| index.contracts.get(&key).map(Contract::summary))
            .collect()
    }

    pub async fn contract_count(&self) -> usize {
        self.index.read().await.contracts.len()
    }

    /// Register every operation of an OpenAPI 3 document.
    ///
    /// Operations that conflict with existing contracts or fail to resolve are
    /// skipped and reported; a persistence failure aborts the import.
    pub async fn import_openapi(&self, document: &Value) -> Result<ImportReport, MockError> {
        let commands = openapi::to_commands(document)?;
        let mut report = ImportReport::default();

        for command in commands {
            let path = command.path.clone();
            let method = command.method;
            match self.register(command).await {
                Ok(instance) => report.registered.push(ImportedRoute {
                    path,
                    method,
                    id: instance.id,
                }),
                Err(e @ MockError::Persistence(_)) => return Err(e),
                Err(e) => {
                    warn!(path = %path, method = %method, error = %e, "Skipped OpenAPI operation");
                    report.skipped.push(SkippedRoute {
                        path,
                        method,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "Imported OpenAPI document"
        );
        Ok(report)
    }

    fn compile(&self, instance: &Instance) -> Result<CompiledInstance, MockError> {
        let root = instance.document_root();
        let request = match instance.request_kind {
            RequestKind::Any => RequestSpec::Any,
            RequestKind::Example => RequestSpec::Example(instance.request.clone()),
            RequestKind::Schema => RequestSpec::Schema(self.resolver.resolve_document(&instance.request, &root)?),
        };
        let response = match instance.response_kind {
            ResponseKind::Literal => ResponseSpec::Literal(instance.response.clone()),
            ResponseKind::Schema => ResponseSpec::Schema(self.resolver.resolve_document(&instance.response, &root)?),
        };
        Ok(CompiledInstance {
            request,
            response,
            status: instance.status,
        })
    }

    async fn produce(&self, node: &SchemaNode) -> (Value, ResponseSource) {
        if let Some(generator) = &self.generator {
            match generator.generate(node).await {
                Ok(value) if RequestValidator::is_valid(&value, node) => {
                    return (value, ResponseSource::Generated);
                }
                Ok(_) => warn!(
                    generator = generator.name(),
                    "Generated value does not satisfy the schema, synthesizing instead"
                ),
                Err(e) => warn!(generator = generator.name(), error = %e, "Value generation failed, synthesizing instead"),
            }
        }
        let mut rng = self.rng();
        (self.synthesizer.synthesize(node, &mut rng), ResponseSource::Synthesized)
    }

    fn rng(&self) -> StdRng {
        match self.options.seed {
            Some(seed) => {
                let draw = self.draws.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed.wrapping_add(draw))
            }
            None => StdRng::from_entropy(),
        }
    }

    fn should_record(&self, request: &MockRequest) -> bool {
        self.options.record_traffic
            && self.options.max_recorded_instances > 0
            && !(request.method.is_read_only() && request.body.is_none())
    }

    async fn record(
        &self,
        key: &RouteKey,
        request: Value,
        response: Value,
        params: BTreeMap<String, String>,
    ) -> Result<(), MockError> {
        let mut index = self.index.write().await;
        let Some(contract) = index.contracts.get_mut(key) else {
            debug!(path = %key.path, method = %key.method, "Contract removed before recording");
            return Ok(());
        };
        if contract.instances.iter().any(|i| i.same_content(&request, &response)) {
            return Ok(());
        }

        contract.instances.push(Instance {
            id: Uuid::new_v4(),
            origin: InstanceOrigin::Recorded,
            request,
            response,
            request_kind: RequestKind::Example,
            response_kind: ResponseKind::Literal,
            status: None,
            definitions: Map::new(),
            params,
            created_at: Utc::now(),
            updated_at: None,
        });

        while contract.recorded_count() > self.options.max_recorded_instances {
            match contract.instances.iter().position(|i| !i.is_registered()) {
                Some(oldest) => {
                    contract.instances.remove(oldest);
                }
                None => break,
            }
        }

        self.persist(index).await
    }

    async fn persist(&self, index: RwLockWriteGuard<'_, RegistryIndex>) -> Result<(), MockError> {
        let _flush = self.flush.lock().await;
        let state = index.snapshot();
        drop(index);
        self.store.save(&state).await.map_err(|e| {
            error!(error = %e, "Failed to persist contract registry");
            MockError::from(e)
        })
    }
}

/// Pick the registered instance that answers `body`.
///
/// In registration order: an example instance equal to the body, then the
/// first schema instance the body satisfies, then the first catch-all
/// instance. Without any schema instance the first instance answers; otherwise
/// the errors of the first schema instance are returned.
fn select_instance(
    key: &RouteKey,
    candidates: Vec<(Uuid, Arc<CompiledInstance>)>,
    body: &Value,
) -> Result<(Uuid, Arc<CompiledInstance>), MockError> {
    if let Some(found) = candidates
        .iter()
        .find(|(_, c)| matches!(&c.request, RequestSpec::Example(example) if example == body))
    {
        return Ok(found.clone());
    }

    let mut first_errors = None;
    for (id, compiled) in &candidates {
        if let RequestSpec::Schema(node) = &compiled.request {
            let errors = RequestValidator::validate(body, node);
            if errors.is_empty() {
                return Ok((*id, Arc::clone(compiled)));
            }
            first_errors.get_or_insert(errors);
        }
    }

    if let Some(found) = candidates
        .iter()
        .find(|(_, c)| matches!(c.request, RequestSpec::Any))
    {
        return Ok(found.clone());
    }

    match first_errors {
        Some(errors) => {
            debug!(path = %key.path, method = %key.method, errors = errors.len(), "Request rejected by schema");
            Err(MockError::Validation(errors))
        }
        None => {
            let first = candidates
                .into_iter()
                .next()
                .ok_or_else(|| MockError::NotFound(format!("no instance for {} {}", key.method, key.path)))?;
            warn!(
                path = %key.path,
                method = %key.method,
                "No example matches the request body, answering with the first instance"
            );
            Ok(first)
        }
    }
}

/// JSON merge patch: objects merge recursively, `null` removes a key, anything
/// else replaces the target.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (name, value) in patch_map {
            if value.is_null() {
                target_map.remove(name);
            } else {
                merge_patch(target_map.entry(name.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
