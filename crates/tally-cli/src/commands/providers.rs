//! Provider, route and credential diagnostics

use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};
use tally_core::{Config, CredentialRegistry, OperationType, RotationRegistry};

use super::{build_runtime, load_config};

/// Providers, routes and per-credential health as JSON
///
/// Credentials appear only as fingerprints.
pub fn providers_report(config: &Config, registry: &RotationRegistry) -> Value {
    let providers: Vec<Value> = config
        .providers
        .values()
        .map(|spec| {
            let credentials: Vec<Value> = registry
                .snapshot(&spec.name)
                .into_iter()
                .map(|c| {
                    json!({
                        "index": c.index,
                        "fingerprint": c.fingerprint,
                        "working": c.working,
                        "cooldown_secs": c.cooldown_remaining.map(|d| d.as_secs()),
                    })
                })
                .collect();
            json!({
                "name": spec.name,
                "kind": spec.kind.as_str(),
                "base_url": spec.base_url,
                "default_model": spec.default_model,
                "uses_proxy": spec.uses_proxy,
                "keys_env": spec.keys_env,
                "credentials": credentials,
            })
        })
        .collect();

    let routes: Vec<Value> = OperationType::all()
        .iter()
        .filter_map(|op| {
            config.route_for(*op).map(|route| {
                json!({
                    "operation": op.as_str(),
                    "primary": route.primary,
                    "fallbacks": route.fallbacks,
                    "timeout_secs": config.timeout_for(*op).as_secs(),
                })
            })
        })
        .collect();

    json!({
        "providers": providers,
        "routes": routes,
        "proxy": config.proxy_url.is_some(),
        "cooldown_secs": config.cooldown.as_secs(),
    })
}

pub fn cmd_providers(config_path: Option<&Path>, json_output: bool) -> Result<()> {
    let runtime = build_runtime(load_config(config_path)?);

    if json_output {
        let report = providers_report(&runtime.config, &runtime.registry);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Providers:\n");
    println!(
        "{:<12} {:<18} {:<24} {:>5}  {}",
        "NAME", "KIND", "MODEL", "KEYS", "PROXY"
    );
    println!("{}", "-".repeat(70));
    for spec in runtime.config.providers.values() {
        println!(
            "{:<12} {:<18} {:<24} {:>5}  {}",
            spec.name,
            spec.kind.as_str(),
            super::truncate(&spec.default_model, 24),
            runtime.registry.pool_size(&spec.name),
            if spec.uses_proxy { "yes" } else { "no" }
        );
        for credential in runtime.registry.snapshot(&spec.name) {
            println!(
                "    #{} {} {}",
                credential.index,
                credential.fingerprint,
                if credential.working { "✓" } else { "✗ cooling down" }
            );
        }
    }

    println!("\nRoutes:\n");
    for op in OperationType::all() {
        match runtime.config.route_for(*op) {
            Some(route) => println!(
                "  {:<15} {} → {}",
                op.as_str(),
                route.primary,
                if route.fallbacks.is_empty() {
                    "(no fallbacks)".to_string()
                } else {
                    route.fallbacks.join(" → ")
                }
            ),
            None => println!("  {:<15} (no providers)", op.as_str()),
        }
    }

    if runtime.registry.providers().is_empty() {
        println!();
        println!("⚠️  No credentials loaded. Set the keys_env variables listed in the config,");
        println!("   e.g. export OPENAI_API_KEYS=\"sk-one,sk-two\"");
    }

    Ok(())
}
