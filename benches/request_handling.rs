use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use proteus::adapters::file_store::MemoryStore;
use proteus::application::{ContractRegistry, RegistryOptions, SchemaResolver, ValueSynthesizer};
use proteus::domain::{HttpMethod, MockRequest, RegisterCommand};
use serde_json::json;
use std::sync::Arc;

fn create_registry(rt: &tokio::runtime::Runtime) -> Arc<ContractRegistry> {
    let registry = Arc::new(ContractRegistry::new(
        Arc::new(MemoryStore::new()),
        SchemaResolver::default(),
        ValueSynthesizer::default(),
        RegistryOptions {
            record_traffic: false,
            ..RegistryOptions::default()
        },
    ));

    rt.block_on(async {
        for i in 0..50 {
            let command = RegisterCommand::new(
                format!("/service{}/items/{{id}}", i),
                HttpMethod::Get,
                serde_json::Value::Null,
                json!({ "id": i, "name": format!("item {}", i) }),
            );
            registry.register(command).await.unwrap();
        }

        let pet = RegisterCommand::new(
            "/pet",
            HttpMethod::Post,
            json!({
                "type": "object",
                "required": ["name"],
                "properties": { "name": { "type": "string" } }
            }),
            json!({
                "type": "object",
                "required": ["id", "name"],
                "properties": {
                    "id": { "type": "integer" },
                    "name": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                }
            }),
        );
        registry.register(pet).await.unwrap();
    });

    registry
}

fn benchmark_literal_response(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = create_registry(&rt);

    let mut group = c.benchmark_group("handle");
    group.throughput(Throughput::Elements(1));
    group.bench_function("literal_with_path_param", |b| {
        b.to_async(&rt).iter(|| async {
            let request = MockRequest::new(HttpMethod::Get, "/service49/items/7");
            black_box(registry.handle(request).await.unwrap())
        })
    });
    group.bench_function("validated_synthesized", |b| {
        b.to_async(&rt).iter(|| async {
            let request = MockRequest::new(HttpMethod::Post, "/pet").with_body(json!({ "name": "Rex" }));
            black_box(registry.handle(request).await.unwrap())
        })
    });
    group.bench_function("rejected", |b| {
        b.to_async(&rt).iter(|| async {
            let request = MockRequest::new(HttpMethod::Post, "/pet").with_body(json!({}));
            black_box(registry.handle(request).await.is_err())
        })
    });
    group.finish();
}

criterion_group!(benches, benchmark_literal_response);
criterion_main!(benches);
