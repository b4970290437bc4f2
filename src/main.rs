//! Interlog - method-interception logging pipeline
//!
//! Usage:
//!   interlog check                       Validate config, print summary
//!   interlog resolve --types types.toml  Print decisions for a type manifest
//!   interlog demo --count 50             Run generated calls through the pipeline

use anyhow::{Context, Result};
use clap::Parser;
use interlog::cli::{Cli, Command};
use interlog::config::{self, InterceptionRule, PipelineConfig};
use interlog::decision::{
    CaptureBehavior, DecisionCache, InterceptionDecision, MethodAnnotation, MethodDescriptor,
    MethodHandle, MethodSignature, TypeDescriptor, TypeRegistry,
};
use interlog::writer::WriterRegistry;
use interlog::LoggingPipeline;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    interlog::init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => config::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Check => run_check(&config),
        Command::Resolve { types } => {
            let registry = TypeRegistry::load(&types)
                .with_context(|| format!("loading type manifest {}", types.display()))?;
            run_resolve(&config, registry)
        }
        Command::Demo { count } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_demo(config, count))
        }
    }
}

fn run_check(config: &PipelineConfig) -> Result<()> {
    let p = &config.pipeline;
    println!("config ok");
    println!(
        "  queue {} entries, batch {} / {}ms, grace {}ms",
        p.queue_capacity, p.max_batch_size, p.batch_timeout_ms, p.shutdown_grace_ms
    );
    println!(
        "  auto-intercept {}, default target {}",
        p.auto_intercept,
        p.default_target.as_deref().unwrap_or("-")
    );
    println!(
        "  formatter {} (fallback {})",
        config.formatting.default_kind,
        if config.formatting.fallback_enabled { "on" } else { "off" }
    );

    let writers = WriterRegistry::with_defaults();
    for (name, target) in &config.targets {
        let status = if !target.enabled {
            "disabled"
        } else if writers.contains(&target.kind) {
            "ok"
        } else {
            "unknown kind, skipped"
        };
        println!("  target {} [{}] min {}: {}", name, target.kind, target.min_level, status);
    }
    for pattern in config.rules.keys() {
        println!("  rule {}", pattern);
    }
    Ok(())
}

fn run_resolve(config: &PipelineConfig, registry: TypeRegistry) -> Result<()> {
    let types = registry.all();
    let cache = DecisionCache::new(config, Arc::new(registry));

    for ty in types {
        let kind = if ty.is_interface { "interface" } else { "class" };
        println!("{} {}", kind, ty.name);
        for method in &ty.methods {
            let decision = cache.resolve(&ty.handle(method));
            println!("  {:<32} {}", method.signature().to_string(), Resolved(decision));
        }
    }
    Ok(())
}

struct Resolved(Option<InterceptionDecision>);

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(decision) => write!(f, "{}", decision),
            None => f.write_str("not logged"),
        }
    }
}

// =============================================================================
// Demo
// =============================================================================

const DEMO_TYPE: &str = "Demo.OrderService";

fn demo_types() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry.register(
        TypeDescriptor::class(DEMO_TYPE)
            .method(
                MethodDescriptor::public("Place")
                    .with_parameters(["String", "u32"])
                    .with_annotation(MethodAnnotation::capture(CaptureBehavior::Both)),
            )
            .method(MethodDescriptor::public("Cancel").with_parameters(["String"]))
            .method(MethodDescriptor::public("Ping").with_annotation(MethodAnnotation::NoLog)),
    );
    registry
}

#[derive(Debug)]
struct OutOfStock(u32);

impl fmt::Display for OutOfStock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "only {} left", self.0)
    }
}

async fn run_demo(mut config: PipelineConfig, count: usize) -> Result<()> {
    config
        .rules
        .entry("Demo.*".to_string())
        .or_insert_with(InterceptionRule::default);

    let pipeline = LoggingPipeline::start(
        &config,
        Arc::new(demo_types()),
        &WriterRegistry::with_defaults(),
    )?;

    // Setup shutdown handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let (Ok(mut sigterm), Ok(mut sigint)) =
            (signal(SignalKind::terminate()), signal(SignalKind::interrupt()))
        {
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
                shutdown_clone.store(true, Ordering::SeqCst);
            });
        }
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_clone.store(true, Ordering::SeqCst);
        });
    }

    let interceptor = pipeline.interceptor().clone();
    let place = MethodHandle::new(
        DEMO_TYPE,
        MethodSignature::new("Place", ["String", "u32"]),
    );
    let cancel = MethodHandle::new(
        DEMO_TYPE,
        MethodSignature::new("Cancel", ["String"]),
    );
    let ping = MethodHandle::simple(DEMO_TYPE, "Ping");

    for i in 0..count {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let order = format!("order-{}", i);
        let quantity = (i % 7) as u32;
        let _ = interceptor.invoke(&place, &json!({ "order": order, "quantity": quantity }), || {
            if quantity > 4 {
                Err(OutOfStock(4))
            } else {
                Ok(json!({ "order": order, "accepted": quantity }))
            }
        });
        if i % 5 == 4 {
            let _ = interceptor.invoke(&cancel, &order, || Ok::<_, OutOfStock>(true));
        }
        let _ = interceptor.invoke(&ping, &(), || Ok::<_, OutOfStock>(()));
        tokio::task::yield_now().await;
    }

    let stats = pipeline.shutdown().await?;
    eprintln!(
        "enqueued {}, processed {}, dropped {}, failed {}, filtered {}, fallbacks {}, batches {}",
        stats.enqueued,
        stats.processed,
        stats.dropped,
        stats.failed,
        stats.filtered,
        stats.fallbacks,
        stats.batches
    );
    Ok(())
}
