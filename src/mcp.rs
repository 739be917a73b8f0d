use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    config::IndexConfig,
    embedder::FastEmbedder,
    error,
    indexer::Indexer,
    query::{QueryService, SearchHit},
    watcher::VaultWatcher,
};

struct VaultState {
    query: QueryService,
    // Held for its side effect: dropping it stops the background sync.
    _watcher: Option<VaultWatcher>,
}

#[derive(Clone)]
pub struct SemvaultMcpServer {
    state: Arc<VaultState>,
    tool_router: ToolRouter<Self>,
}

impl SemvaultMcpServer {
    fn new(state: VaultState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl SemvaultMcpServer {
    /// Semantic top-k search over the vault.
    #[tool(
        name = "search_related",
        description = "Find vault notes semantically related to a query. Returns paths with cosine similarity scores."
    )]
    pub async fn search_related(
        &self,
        params: Parameters<SearchRelatedParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;

        let results = self
            .state
            .query
            .search_related(&params.query, params.top_k)
            .map_err(|e| mcp_error("search failed", e))?;

        let summary = format_hits(&results, &format!("for \"{}\"", params.query));
        let structured = serde_json::to_value(SearchResponse {
            query: params.query,
            result_count: results.len(),
            results,
        })
        .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Near-duplicate detection for one document.
    #[tool(
        name = "check_duplicates",
        description = "List vault notes whose content is nearly identical to the given file. Useful before creating a new note."
    )]
    pub async fn check_duplicates(
        &self,
        params: Parameters<CheckDuplicatesParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;

        let results = self
            .state
            .query
            .check_duplicates(&params.file_path, params.threshold)
            .map_err(|e| mcp_error("duplicate check failed", e))?;

        let summary = format_hits(&results, &format!("similar to {}", params.file_path));
        let structured = serde_json::to_value(DuplicatesResponse {
            file_path: params.file_path,
            result_count: results.len(),
            results,
        })
        .map_err(|e| mcp_error("failed to serialize duplicate results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for SemvaultMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = Implementation::new("semvault", env!("CARGO_PKG_VERSION"))
            .with_title("semvault MCP");
        info.instructions = Some(
            "Use search_related to find notes by topic and check_duplicates before creating a note that may already exist."
                .to_string(),
        );
        info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRelatedParams {
    /// Free-text search query.
    pub query: String,
    /// Maximum number of results (default: 5).
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckDuplicatesParams {
    /// Path of the note to check, absolute or vault-relative.
    pub file_path: String,
    /// Similarity threshold in (0, 1] (default: 0.85).
    pub threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    result_count: usize,
    results: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
struct DuplicatesResponse {
    file_path: String,
    result_count: usize,
    results: Vec<SearchHit>,
}

fn format_hits(results: &[SearchHit], what: &str) -> String {
    if results.is_empty() {
        return format!("No results found {what}");
    }

    let mut lines = Vec::with_capacity(results.len() + 1);
    let suffix = if results.len() == 1 { "" } else { "s" };
    lines.push(format!("Found {} result{suffix} {what}:", results.len()));
    for hit in results {
        lines.push(format!("{:.3} {}", hit.score, hit.path));
    }
    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Build the index, start the change watcher, and serve MCP over stdio.
pub fn run_mcp(config: IndexConfig) -> error::Result<()> {
    let embedder = Arc::new(FastEmbedder::new(&config.model_id)?);
    let indexer = Arc::new(Indexer::new(config, embedder));
    indexer.initialize()?;

    let watcher = VaultWatcher::start(indexer.clone())?;
    let state = VaultState {
        query: QueryService::new(indexer),
        _watcher: Some(watcher),
    };
    let server = SemvaultMcpServer::new(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| error::Error::Config(format!("failed to start tokio runtime: {e}")))?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server
            .serve(transport)
            .await
            .map_err(|e| error::Error::Config(format!("MCP server initialization failed: {e}")))?;
        running
            .waiting()
            .await
            .map_err(|e| error::Error::Config(format!("MCP server error: {e}")))?;
        Ok(())
    })
}
