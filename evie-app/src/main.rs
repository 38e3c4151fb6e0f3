//! Evie console host.
//!
//! Composition root: loads settings, builds the permission gateway, listener,
//! transport and orchestrator, forwards their events to the terminal, and hands
//! stdin to the console. The wake word engine here is the development
//! `ManualClassifier`, so detections are typed rather than spoken.

mod console;
mod settings;
mod state;

use std::sync::{atomic::Ordering, Arc};

use anyhow::Context;
use evie_core::{
    classifier::stub::ManualClassifierFactory,
    dispatch::stub::ScriptedIntent,
    permissions::{stub::StaticPermissions, PermissionBackend},
    DispatchOrchestrator, DispatchStatus, IntentTransport, MessageDispatcher, PermissionGateway,
    Platform, RelayTransport, SmsTransport, WakeWordListener,
};
use settings::{default_settings_path, load_settings, save_settings, EnvOverrides};
use state::AppState;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("evie=info,evie_core=info")),
        )
        .init();

    info!("Evie starting");

    let settings_path = default_settings_path();
    let settings = load_settings(&settings_path);
    if !settings_path.exists() {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("writing default settings to {}", settings_path.display()))?;
        info!(path = %settings_path.display(), "default settings written");
    }
    let overrides = EnvOverrides::from_env();
    let effective = settings.with_overrides(&overrides);

    let platform = effective.platform();
    let permissions = Arc::new(PermissionGateway::new(
        Arc::new(StaticPermissions::granting_all(platform)) as Arc<dyn PermissionBackend>,
    ));

    let factory = ManualClassifierFactory::new();
    let probe = factory.probe();
    let listener = WakeWordListener::new(
        effective.listener_config(),
        Arc::new(factory),
        Arc::clone(&permissions),
    );

    let transport: Arc<dyn SmsTransport> = match platform {
        Platform::Intent => Arc::new(IntentTransport::new(
            Arc::clone(&permissions),
            Arc::new(ScriptedIntent::new()),
        )),
        Platform::Relay => Arc::new(
            RelayTransport::new(effective.relay_config()).context("configuring SMS relay")?,
        ),
    };
    let dispatcher = Arc::new(MessageDispatcher::new(effective.dispatch_config(), transport));
    let orchestrator = Arc::new(DispatchOrchestrator::new(dispatcher));
    match effective.binding() {
        Some(binding) => orchestrator.bind(binding),
        None => println!("No message is bound yet. Use `bind <number> <message>`."),
    }

    let access_key = effective.access_key.clone().unwrap_or_default();
    let keyword = effective.keyword.clone();
    let sensitivity = effective.sensitivity;

    let state = Arc::new(AppState::new(
        listener.clone(),
        Arc::clone(&orchestrator),
        permissions,
        probe,
        settings,
        overrides,
        settings_path,
    ));

    spawn_forwarders(&state);
    tokio::spawn(Arc::clone(&orchestrator).run(listener.subscribe_detections()));

    match listener.initialize(&access_key, &keyword, sensitivity).await {
        Ok(()) => {
            if let Err(e) = listener.start() {
                println!("Could not start listening: {}", e.detail().message);
            }
        }
        Err(e) => {
            let detail = e.detail();
            tracing::error!(code = %detail.code, "wake word listener failed to initialize: {e}");
            println!("Evie cannot listen yet: {}", detail.message);
            if detail.code == "INVALID_ACCESS_KEY" {
                println!("Set EVIE_ACCESS_KEY or `accessKey` in the settings file.");
            }
        }
    }

    console::run(&state).await?;

    listener.release();
    info!("Evie stopped");
    Ok(())
}

fn spawn_forwarders(state: &Arc<AppState>) {
    let mut status_rx = state.listener.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => match event.detail {
                    Some(detail) => println!("[listener] {:?}: {detail}", event.state),
                    None => println!("[listener] {:?}", event.state),
                },
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("status receiver lagged by {n} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut error_rx = state.listener.subscribe_errors();
    let state_for_errors = Arc::clone(state);
    tokio::spawn(async move {
        loop {
            match error_rx.recv().await {
                Ok(event) => {
                    state_for_errors
                        .listener_errors
                        .fetch_add(1, Ordering::Relaxed);
                    println!(
                        "[listener error] {} ({}): {}",
                        event.error.code,
                        if event.error.recoverable {
                            "recovering"
                        } else {
                            "not recoverable"
                        },
                        event.error.message
                    );
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("error receiver lagged by {n} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let detection_rx = state.listener.subscribe_detections();
    let state_for_detections = Arc::clone(state);
    tokio::spawn(count_detections(detection_rx, state_for_detections));

    let mut dispatch_rx = state.orchestrator.subscribe();
    let state_for_dispatch = Arc::clone(state);
    tokio::spawn(async move {
        loop {
            match dispatch_rx.recv().await {
                Ok(event) => {
                    let counter = match event.result.status {
                        DispatchStatus::Sent | DispatchStatus::Delivered => {
                            &state_for_dispatch.dispatch_success
                        }
                        _ => &state_for_dispatch.dispatch_failed,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                    // Announcement is what a screen reader would speak.
                    println!("[evie] {}", event.announcement);
                    if let Some(fallback) = event.fallback {
                        println!("{}", fallback.clipboard_text());
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("dispatch receiver lagged by {n} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn count_detections(
    mut rx: Receiver<evie_core::DetectionEvent>,
    state: Arc<AppState>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                state.detections_seen.fetch_add(1, Ordering::Relaxed);
                info!(
                    seq = event.seq,
                    keyword = %event.keyword,
                    confidence = event.confidence,
                    "wake word detected"
                );
            }
            Err(RecvError::Lagged(n)) => {
                tracing::warn!("detection receiver lagged by {n} events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
