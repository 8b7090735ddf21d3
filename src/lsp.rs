//! LSP server implementation using tower-lsp.
//!
//! The backend owns the document snapshots and settings; every document
//! event funnels into [`crate::session::validate`], spawned so handlers
//! return promptly. Settings and watched-file changes re-validate all
//! open documents sequentially.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::config::Settings;
use crate::session::{self, Document, ExecutableCache, InFlight, ServerState};

/// Parameters for the validation lifecycle notifications.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationStatusParams {
    /// Document being validated.
    pub uri: Url,
}

/// Sent when a document's validation begins.
#[derive(Debug)]
pub enum ValidationStarted {}

impl Notification for ValidationStarted {
    type Params = ValidationStatusParams;
    const METHOD: &'static str = "sniffles/validationStarted";
}

/// Sent when a document's validation finishes, successfully or not.
#[derive(Debug)]
pub enum ValidationEnded {}

impl Notification for ValidationEnded {
    type Params = ValidationStatusParams;
    const METHOD: &'static str = "sniffles/validationEnded";
}

/// The sniffles LSP backend.
pub struct Backend {
    client: Client,
    state: Arc<RwLock<ServerState>>,
    in_flight: InFlight,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Backend {
            client,
            state: Arc::new(RwLock::new(ServerState::new(Settings::default()))),
            in_flight: InFlight::default(),
        }
    }

    /// Queue a validation of `uri` without blocking the event handler.
    fn spawn_validation(&self, uri: Url) {
        tokio::spawn(session::validate(
            Arc::clone(&self.state),
            self.client.clone(),
            self.in_flight.clone(),
            uri,
        ));
    }

    /// Re-validate every open document, one after another.
    async fn revalidate_all(&self) {
        let uris: Vec<Url> = {
            let state = self.state.read().await;
            state.documents.keys().cloned().collect()
        };
        for uri in uris {
            session::validate(
                Arc::clone(&self.state),
                self.client.clone(),
                self.in_flight.clone(),
                uri,
            )
            .await;
        }
    }

    /// Clear published diagnostics for every open document.
    async fn clear_all_diagnostics(&self) {
        let uris: Vec<Url> = {
            let state = self.state.read().await;
            state.documents.keys().cloned().collect()
        };
        for uri in uris {
            self.client.publish_diagnostics(uri, Vec::new(), None).await;
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Record the workspace root for relative-path resolution and as
        // the subprocess working directory.
        #[allow(deprecated)]
        let root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .map(|folder| folder.uri.clone())
            .or(params.root_uri);

        if let Some(root_uri) = root
            && let Ok(path) = root_uri.to_file_path()
        {
            let mut state = self.state.write().await;
            let mut settings = (*state.settings).clone();
            settings.workspace_root = Some(path);
            state.settings = Arc::new(settings);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..Default::default()
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "sniffles".to_string(),
                version: option_env!("CARGO_PKG_VERSION").map(|s| s.to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "sniffles LSP initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        {
            let mut state = self.state.write().await;
            state.documents.insert(
                uri.clone(),
                Document {
                    text: params.text_document.text,
                    version: params.text_document.version,
                },
            );
        }
        self.spawn_validation(uri);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // Full sync: the last change carries the complete text.
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        {
            let mut state = self.state.write().await;
            state.documents.insert(
                uri.clone(),
                Document {
                    text: change.text,
                    version: params.text_document.version,
                },
            );
        }
        self.spawn_validation(uri);
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.spawn_validation(params.text_document.uri);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        {
            let mut state = self.state.write().await;
            state.documents.remove(&uri);
        }
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let incoming = match Settings::from_configuration(params.settings) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed configuration payload");
                return;
            }
        };

        let enabled = {
            let mut state = self.state.write().await;
            let mut settings = incoming;
            // The configuration payload does not carry the root; keep the
            // one captured at initialize.
            if settings.workspace_root.is_none() {
                settings.workspace_root = state.settings.workspace_root.clone();
            }

            if *state.settings != settings {
                // New record, new resolution: drop any cached executable
                // or cached fatal failure.
                state.executable = ExecutableCache::Unresolved;
            }
            state.settings = Arc::new(settings);
            state.settings.enable
        };

        if enabled {
            self.revalidate_all().await;
        } else {
            self.clear_all_diagnostics().await;
        }
    }

    async fn did_change_watched_files(&self, _params: DidChangeWatchedFilesParams) {
        // Ruleset or composer files changed on disk; results may differ
        // even though settings did not.
        self.revalidate_all().await;
    }
}

/// Run the LSP server on stdin/stdout.
pub async fn run() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new).finish();
    Server::new(stdin, stdout, socket).serve(service).await;
}
