//! Per-document validation orchestration.
//!
//! One document validates at a time: an in-flight set guards against two
//! subprocesses racing against the same URI, with removal guaranteed on
//! every exit path by a scoped guard. Executable resolution happens
//! lazily on first use and is cached until a settings change; fatal
//! resolution failures are cached too, so a broken workspace surfaces one
//! actionable error instead of re-probing on every keystroke.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tower_lsp::Client;
use tower_lsp::lsp_types::{Diagnostic, MessageType, Url};

use crate::command::{self, CommandPlan};
use crate::config::Settings;
use crate::diagnostics;
use crate::error::LintError;
use crate::lsp::{ValidationEnded, ValidationStarted, ValidationStatusParams};
use crate::process;
use crate::report;
use crate::resolver::{self, ResolvedExecutable};
use crate::version;

/// A snapshot of an open document.
#[derive(Debug, Clone)]
pub struct Document {
    pub text: String,
    pub version: i32,
}

/// Lazily-resolved executable state, poisoned by fatal errors until the
/// next settings change clears it.
#[derive(Debug, Clone, Default)]
pub enum ExecutableCache {
    #[default]
    Unresolved,
    Ready(ResolvedExecutable),
    Failed(LintError),
}

/// Shared server state. Settings are replaced wholesale (copy-on-write),
/// never mutated, so validations hold a consistent snapshot.
pub struct ServerState {
    pub settings: Arc<Settings>,
    pub documents: HashMap<Url, Document>,
    pub executable: ExecutableCache,
}

impl ServerState {
    pub fn new(settings: Settings) -> Self {
        ServerState {
            settings: Arc::new(settings),
            documents: HashMap::new(),
            executable: ExecutableCache::Unresolved,
        }
    }
}

/// Guard set ensuring at most one in-flight validation per document.
#[derive(Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<Url>>>);

impl InFlight {
    /// Claim `uri`. Returns `None` when a validation is already running,
    /// in which case the trigger is dropped.
    pub fn try_begin(&self, uri: &Url) -> Option<InFlightGuard> {
        let mut set = self.0.lock().expect("in-flight set poisoned");
        if !set.insert(uri.clone()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.0),
            uri: uri.clone(),
        })
    }
}

/// Removes the claimed URI when dropped, on every exit path.
pub struct InFlightGuard {
    set: Arc<Mutex<HashSet<Url>>>,
    uri: Url,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.set.lock().expect("in-flight set poisoned");
        set.remove(&self.uri);
    }
}

/// Validate one document end to end and publish the outcome.
///
/// Emits `validationStarted`/`validationEnded` notifications around the
/// pipeline; the ended notification fires whether the pipeline succeeded
/// or not. Failures become a user-visible message and leave the previous
/// diagnostics untouched; success replaces them, possibly with an empty
/// set.
pub async fn validate(
    state: Arc<RwLock<ServerState>>,
    client: Client,
    in_flight: InFlight,
    uri: Url,
) {
    let Some(_guard) = in_flight.try_begin(&uri) else {
        tracing::debug!(%uri, "validation already in flight, dropping trigger");
        return;
    };

    let (document, settings) = {
        let state = state.read().await;
        let Some(document) = state.documents.get(&uri).cloned() else {
            return;
        };
        (document, Arc::clone(&state.settings))
    };

    if !settings.enable {
        // Disabled clears published diagnostics instead of validating.
        client
            .publish_diagnostics(uri, Vec::new(), Some(document.version))
            .await;
        return;
    }

    client
        .send_notification::<ValidationStarted>(ValidationStatusParams { uri: uri.clone() })
        .await;

    let outcome = run_pipeline(&state, &uri, &document.text, &settings).await;

    client
        .send_notification::<ValidationEnded>(ValidationStatusParams { uri: uri.clone() })
        .await;

    match outcome {
        Ok(diagnostics) => {
            tracing::debug!(%uri, count = diagnostics.len(), "publishing diagnostics");
            client
                .publish_diagnostics(uri, diagnostics, Some(document.version))
                .await;
        }
        Err(err) => {
            tracing::error!(%uri, error = %err, "validation failed");
            client
                .show_message(MessageType::ERROR, format!("phpcs: {}", err.user_message()))
                .await;
        }
    }
}

/// The full pipeline for one document: ensure executable, build the
/// command, run the tool, parse the report, map messages onto the text.
pub async fn run_pipeline(
    state: &Arc<RwLock<ServerState>>,
    uri: &Url,
    text: &str,
    settings: &Settings,
) -> Result<Vec<Diagnostic>, LintError> {
    let executable = ensure_executable(state).await?;

    let file_path = uri.to_file_path().ok();
    let standard = command::effective_standard(settings, file_path.as_deref());
    let plan = command::build(
        executable.version,
        settings,
        file_path.as_deref(),
        standard.as_deref(),
        text,
    );

    let (args, stdin) = match plan {
        CommandPlan::Skip(reason) => {
            tracing::debug!(%uri, ?reason, "lint skipped");
            return Ok(Vec::new());
        }
        CommandPlan::Invoke { args, stdin } => (args, stdin),
    };

    let output = process::run(
        &executable.path,
        &args,
        &stdin,
        settings.workspace_root.as_deref(),
        process::LINT_TIMEOUT,
    )
    .await?;

    let command_line = format!("{} {}", executable.path.display(), args.join(" "));
    let key = report::report_key(file_path.as_deref(), executable.version);
    let messages = report::parse(&output.stdout, &output.stderr, &key, &command_line)?;

    Ok(messages
        .iter()
        .map(|message| diagnostics::map(text, message, settings.show_sources))
        .collect())
}

/// Resolve and probe the executable, caching the result.
///
/// Fatal errors are cached and replayed so a misconfigured workspace does
/// not re-resolve on every event; anything else is returned without
/// poisoning the cache. Two documents may race here after a settings
/// change; both compute the same answer and the last write wins.
pub async fn ensure_executable(
    state: &Arc<RwLock<ServerState>>,
) -> Result<ResolvedExecutable, LintError> {
    let settings = {
        let state = state.read().await;
        match &state.executable {
            ExecutableCache::Ready(executable) => return Ok(executable.clone()),
            ExecutableCache::Failed(err) => return Err(err.clone()),
            ExecutableCache::Unresolved => Arc::clone(&state.settings),
        }
    };

    let result = resolve_and_probe(&settings).await;

    let mut state = state.write().await;
    match &result {
        Ok(executable) => state.executable = ExecutableCache::Ready(executable.clone()),
        Err(err) if err.is_fatal() => state.executable = ExecutableCache::Failed(err.clone()),
        Err(_) => {}
    }
    result
}

async fn resolve_and_probe(settings: &Settings) -> Result<ResolvedExecutable, LintError> {
    let path = resolver::resolve(settings)?;
    let version = version::probe(&path, process::PROBE_TIMEOUT).await?;
    tracing::info!(path = %path.display(), %version, "resolved phpcs");
    Ok(ResolvedExecutable { path, version })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn second_trigger_for_same_uri_is_rejected() {
        let in_flight = InFlight::default();
        let doc = uri("file:///project/src/index.php");

        let guard = in_flight.try_begin(&doc);
        assert!(guard.is_some());
        assert!(in_flight.try_begin(&doc).is_none());

        // Distinct documents are unaffected.
        let other = uri("file:///project/src/other.php");
        assert!(in_flight.try_begin(&other).is_some());
    }

    #[test]
    fn guard_release_allows_the_next_trigger() {
        let in_flight = InFlight::default();
        let doc = uri("file:///project/src/index.php");

        drop(in_flight.try_begin(&doc).unwrap());
        assert!(in_flight.try_begin(&doc).is_some());
    }

    #[tokio::test]
    async fn fatal_resolution_failure_is_cached() {
        // Relative executable path with no workspace root: NotFound.
        let settings = Settings {
            executable_path: Some("tools/phpcs".to_string()),
            ..Settings::default()
        };
        let state = Arc::new(RwLock::new(ServerState::new(settings)));

        let first = ensure_executable(&state).await;
        assert!(matches!(first, Err(LintError::NotFound)));

        {
            let state = state.read().await;
            assert!(matches!(state.executable, ExecutableCache::Failed(_)));
        }

        // The cached failure is replayed without re-resolving.
        let second = ensure_executable(&state).await;
        assert!(matches!(second, Err(LintError::NotFound)));
    }
}
