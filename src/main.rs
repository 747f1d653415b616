//! Queryon CLI entry point.
//!
//! Loads configuration, wires the adapters and runs an interactive chat
//! loop over a tracked conversation. Without an API key the mock provider is
//! used; without a database everything is kept in memory.
//!
//! Commands: `/new` starts a new conversation, `/history` prints it,
//! `/reload` reloads rules, `/quit` exits.

use std::error::Error;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use queryon::adapters::{
    HttpToolExecutor, InMemoryConversationStore, InMemoryRuleRepository, MockLlmProvider,
    OpenAiConfig, OpenAiProvider, PostgresConversationStore, PostgresRuleRepository,
    QdrantRetrievalBackend,
};
use queryon::application::orchestrator::{Orchestrator, ToolDefinition, ToolRegistry};
use queryon::application::{
    EndConversationCommand, EndConversationHandler, GetConversationHistoryHandler,
    GetConversationHistoryQuery, ProcessMessageCommand, ProcessMessageHandler,
    StartConversationCommand, StartConversationHandler,
};
use queryon::config::{AppConfig, ToolsConfig};
use queryon::domain::foundation::ConversationId;
use queryon::ports::{
    ConversationRepository, EmbeddingProvider, LlmProvider, MessageRepository, RetrievalBackend,
    RuleRepository, TurnRecorder,
};

const PLATFORM: &str = "cli";
const HISTORY_PRINT_LIMIT: usize = 20;

struct Stores {
    rules: Arc<dyn RuleRepository>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    recorder: Arc<dyn TurnRecorder>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    config.logging.init()?;
    config.validate()?;

    let stores = connect_stores(&config).await?;

    let (llm, embedder): (Arc<dyn LlmProvider>, Option<Arc<dyn EmbeddingProvider>>) =
        match OpenAiConfig::from_settings(&config.ai) {
            Some(provider_config) => {
                let provider = Arc::new(OpenAiProvider::new(provider_config)?);
                let embedder = config
                    .ai
                    .embeddings_enabled
                    .then(|| provider.clone() as Arc<dyn EmbeddingProvider>);
                (provider as Arc<dyn LlmProvider>, embedder)
            }
            None => {
                tracing::warn!("No API key configured, using the mock model provider");
                (Arc::new(MockLlmProvider::new()) as Arc<dyn LlmProvider>, None)
            }
        };

    let retrieval = QdrantRetrievalBackend::from_config(&config.retrieval)?
        .map(|backend| Arc::new(backend) as Arc<dyn RetrievalBackend>);

    let mut builder = Orchestrator::builder()
        .with_config(config.bot.clone())
        .with_llm(llm)
        .with_rules(stores.rules.list_active().await?)
        .with_tools(build_tools(&config.tools)?)
        .with_top_k(config.retrieval.top_k);
    if let Some(embedder) = embedder {
        builder = builder.with_embedder(embedder);
    }
    if let Some(retrieval) = retrieval {
        builder = builder.with_retrieval(retrieval);
    }
    let orchestrator = Arc::new(builder.build().await?);

    let start = StartConversationHandler::new(stores.conversations.clone());
    let end = EndConversationHandler::new(stores.conversations.clone());
    let history = GetConversationHistoryHandler::new(stores.conversations.clone(), stores.messages.clone());
    let process = ProcessMessageHandler::new(
        orchestrator.clone(),
        stores.conversations.clone(),
        stores.messages.clone(),
        stores.recorder.clone(),
    );

    let mut conversation_id = start
        .handle(StartConversationCommand::new(PLATFORM))
        .await?
        .conversation_id;
    let no_answer = config.bot.messages.no_answer.clone();

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(format!("{} is ready. Type /quit to exit.\n", config.bot.bot_name).as_bytes())
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let output = match input {
            "/quit" | "/exit" => break,
            "/new" => {
                end.handle(EndConversationCommand { conversation_id }).await?;
                conversation_id = start
                    .handle(StartConversationCommand::new(PLATFORM))
                    .await?
                    .conversation_id;
                format!("Started conversation {}", conversation_id)
            }
            "/history" => print_history(&history, conversation_id).await?,
            "/reload" => {
                let count = orchestrator.reload_rules_from(stores.rules.as_ref()).await?;
                format!("Reloaded {} rules", count)
            }
            query => match process.handle(ProcessMessageCommand::new(conversation_id, query)).await {
                Ok(outcome) => {
                    let result = outcome.result;
                    let answer = result.answer_text().map(str::to_string).unwrap_or_else(|| no_answer.clone());
                    format!(
                        "{}\n  [{} via {:?}, {:.0} ms]",
                        answer,
                        result.intent,
                        result.classifier_layer(),
                        result.metrics.total_ms
                    )
                }
                Err(e) => {
                    tracing::error!("Failed to process message: {}", e);
                    e.user_message().to_string()
                }
            },
        };
        stdout.write_all(format!("{}\n", output).as_bytes()).await?;
    }

    end.handle(EndConversationCommand { conversation_id }).await?;
    Ok(())
}

async fn connect_stores(config: &AppConfig) -> Result<Stores, Box<dyn Error>> {
    if let Some(database) = &config.database {
        let pool = database.connect().await?;
        tracing::info!("Using PostgreSQL storage");
        let store = Arc::new(PostgresConversationStore::new(pool.clone()));
        return Ok(Stores {
            rules: Arc::new(PostgresRuleRepository::new(pool)),
            conversations: store.clone(),
            messages: store.clone(),
            recorder: store,
        });
    }

    let rules = match &config.rules_path {
        Some(path) => InMemoryRuleRepository::load_file(path)?,
        None => InMemoryRuleRepository::new(),
    };
    let store = Arc::new(InMemoryConversationStore::new());
    Ok(Stores {
        rules: Arc::new(rules),
        conversations: store.clone(),
        messages: store.clone(),
        recorder: store,
    })
}

fn build_tools(config: &ToolsConfig) -> Result<ToolRegistry, Box<dyn Error>> {
    let mut registry = ToolRegistry::new();
    if config.tools.is_empty() {
        return Ok(registry);
    }

    let mut executor = HttpToolExecutor::new(config.timeout())?;
    for tool in &config.tools {
        executor = executor.with_endpoint(&tool.name, &tool.url);
    }
    let executor = Arc::new(executor);

    for tool in &config.tools {
        registry.register(
            ToolDefinition::new(&tool.name, &tool.description)
                .with_parameters(tool.parameters.clone())
                .with_triggers(tool.triggers.iter().cloned())
                .with_executor(executor.clone()),
        );
        if !tool.enabled {
            registry.set_enabled(&tool.name, false);
        }
    }
    Ok(registry)
}

async fn print_history(
    handler: &GetConversationHistoryHandler,
    conversation_id: ConversationId,
) -> Result<String, Box<dyn Error>> {
    let messages = handler
        .handle(GetConversationHistoryQuery {
            conversation_id,
            last_n: HISTORY_PRINT_LIMIT,
        })
        .await?;

    Ok(messages
        .iter()
        .map(|m| format!("{}: {}", m.role(), m.content()))
        .collect::<Vec<_>>()
        .join("\n"))
}
