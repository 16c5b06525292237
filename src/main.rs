use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use hrconnect_client::{
    AuthContext, HttpBackend, MessageFormatter, RegisterForm, RouteDecision, RouteGuard,
    SessionMonitor,
};
use hrconnect_config::HrConfig;
use hrconnect_conversation::{
    full_screen_route, ChatSession, ChatStorage, FileStore, LoadOutcome, Rejection, SendOutcome,
    SessionOptions,
};
use hrconnect_core::{
    AuthBackend, ConversationId, LeaveType, Message, Sender, SESSION_EXPIRED_TEXT,
    SUGGESTED_PROMPTS,
};
use hrconnect_leave::{LeaveForm, LeaveService};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hrconnect")]
#[command(about = "HRConnect Aiva: HR self-service with an AI assistant", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "hrconnect.yaml")]
    config: PathBuf,

    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the access token
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },

    /// Create an account
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,

        /// Repeat the password; defaults to the password itself
        #[arg(long)]
        confirm_password: Option<String>,
    },

    /// Sign out and forget the chat session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Interactive conversation with Aiva
    Chat {
        /// Open an existing conversation
        #[arg(long)]
        conversation: Option<i64>,
    },

    /// Ask a single question in the current conversation
    Ask {
        question: String,
    },

    /// List previous conversations
    History,

    /// Print a conversation
    Show {
        id: i64,
    },

    /// Delete a conversation
    Delete {
        id: i64,
    },

    /// Leave balances, history and applications
    Leave {
        #[command(subcommand)]
        action: LeaveCommand,
    },

    /// Show where a route leads for the current sign-in state
    Route {
        path: String,
    },
}

#[derive(Subcommand)]
enum LeaveCommand {
    /// Remaining days per leave type
    Balance,

    /// All leave requests
    History,

    /// Apply for leave
    Apply {
        /// vacation, sick or emergency
        #[arg(long = "type")]
        leave_type: String,

        #[arg(long)]
        days: f64,

        #[arg(long)]
        reason: String,
    },
}

struct App {
    config: HrConfig,
    auth: Arc<AuthContext>,
    backend: Arc<HttpBackend>,
    storage: ChatStorage,
}

impl App {
    fn new(config: HrConfig) -> Result<Self> {
        let store = Arc::new(FileStore::open(&config.storage.data_dir, config.base_url())?);
        info!("Using storage at {:?}", store.path());

        let auth = Arc::new(AuthContext::new(store.clone()));
        let backend = Arc::new(HttpBackend::from_config(&config, auth.clone())?);

        Ok(Self {
            config,
            auth,
            backend,
            storage: ChatStorage::new(store),
        })
    }

    fn chat_session(&self) -> ChatSession {
        ChatSession::open(
            self.backend.clone(),
            self.storage.clone(),
            SessionOptions {
                query_timeout: self.config.query_timeout(),
                login_marker: self.auth.login_id(),
            },
        )
    }

    fn leave_service(&self) -> LeaveService {
        LeaveService::new(self.backend.clone())
    }

    /// Refuse commands behind a protected route when signed out.
    fn require(&self, route: &str) -> Result<()> {
        match RouteGuard::check(route, self.auth.is_authenticated()) {
            RouteDecision::Redirect("/login") => {
                bail!("Not logged in. Run `hrconnect login` first.")
            }
            _ => Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let config = if cli.config.exists() {
        info!("Loading configuration from: {:?}", cli.config);
        HrConfig::from_yaml(&cli.config)?
    } else {
        info!("Using default configuration");
        HrConfig::default()
    };

    let app = App::new(config)?;

    match cli.command {
        Commands::Login { email, password } => login(&app, &email, &password).await?,
        Commands::Register {
            email,
            password,
            confirm_password,
        } => {
            let form = RegisterForm {
                confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
                email,
                password,
            };
            register(&app, form).await?;
        }
        Commands::Logout => logout(&app).await?,
        Commands::Whoami => whoami(&app).await?,
        Commands::Chat { conversation } => {
            app.require("/chat")?;
            interactive_chat(&app, conversation.map(ConversationId)).await?;
        }
        Commands::Ask { question } => {
            app.require("/chat")?;
            ask(&app, &question).await?;
        }
        Commands::History => {
            app.require("/chat")?;
            list_conversations(&app.chat_session()).await?;
        }
        Commands::Show { id } => {
            app.require("/chat")?;
            show_conversation(&app, ConversationId(id)).await?;
        }
        Commands::Delete { id } => {
            app.require("/chat")?;
            delete_conversation(&app.chat_session(), ConversationId(id)).await?;
        }
        Commands::Leave { action } => {
            app.require("/dashboard")?;
            leave(&app, action).await?;
        }
        Commands::Route { path } => {
            match RouteGuard::check(&path, app.auth.is_authenticated()) {
                RouteDecision::Allow => println!("✅ {path}: allowed"),
                RouteDecision::Redirect(to) => println!("↪️  {path}: redirect to {to}"),
            }
        }
    }

    Ok(())
}

async fn login(app: &App, email: &str, password: &str) -> Result<()> {
    app.backend.login(email, password).await?;
    let user = app.backend.validate().await?;
    println!("✅ Logged in as {}", user.email);
    Ok(())
}

async fn register(app: &App, form: RegisterForm) -> Result<()> {
    form.validate()?;
    app.backend.register(form.email.trim(), &form.password).await?;
    println!("✅ Account created for {}. You can now log in.", form.email.trim());
    Ok(())
}

async fn logout(app: &App) -> Result<()> {
    let result = app.backend.logout().await;
    app.chat_session().reset().await;
    match result {
        Ok(()) => println!("👋 Logged out"),
        Err(e) => println!("👋 Logged out locally ({e})"),
    }
    Ok(())
}

async fn whoami(app: &App) -> Result<()> {
    let user = app.backend.validate().await?;
    println!("👤 {} (user id {})", user.email, user.user_id);
    Ok(())
}

async fn ask(app: &App, question: &str) -> Result<()> {
    let session = app.chat_session();
    match session.send(question).await {
        SendOutcome::Replied(reply) | SendOutcome::Failed(reply) => print_message(&reply),
        SendOutcome::Rejected(Rejection::EmptyInput) => bail!("Question cannot be empty"),
        SendOutcome::Rejected(Rejection::InFlight) => bail!("A message is still being answered"),
        SendOutcome::Discarded => {}
    }
    if let Some(id) = session.conversation_id() {
        println!("(conversation {id}, full screen: {})", full_screen_route(Some(id)));
    }
    Ok(())
}

async fn interactive_chat(app: &App, conversation: Option<ConversationId>) -> Result<()> {
    let session = app.chat_session();

    {
        let expired = session.clone();
        app.auth.on_unauthorized(move || {
            eprintln!("\n⚠️  {SESSION_EXPIRED_TEXT}");
            let expired = expired.clone();
            tokio::spawn(async move { expired.reset().await });
        });
    }
    let _monitor = SessionMonitor::spawn(
        app.backend.clone() as Arc<dyn AuthBackend>,
        app.auth.clone(),
        app.config.validate_interval(),
    );

    match conversation {
        Some(id) => report_load(session.switch_conversation(id).await?),
        None => report_load(session.resume().await?),
    }

    println!("🤖 Aiva, your HR assistant");
    println!("Commands: /new, /history, /open <id>, /delete <id>, /exit");
    println!("═══════════════════════════════════════\n");

    print_transcript(&session.snapshot().messages);

    loop {
        if !app.auth.is_authenticated() {
            break;
        }

        print!("You> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        let command = match input.split_once(' ').unwrap_or((input, "")) {
            ("/exit" | "/quit", _) => {
                println!("Goodbye!");
                break;
            }
            (command @ ("/new" | "/history" | "/open" | "/delete"), arg) => (command, arg.trim()),
            _ => {
                println!("⏳ Aiva is typing...");
                match session.send(input).await {
                    SendOutcome::Replied(reply) | SendOutcome::Failed(reply) => {
                        print_message(&reply);
                        println!();
                    }
                    SendOutcome::Rejected(_) | SendOutcome::Discarded => {}
                }
                continue;
            }
        };

        // Request errors stay inline; the user retries.
        if let Err(e) = run_command(&session, command).await {
            println!("⚠️  {e}\n");
        }
    }

    Ok(())
}

async fn run_command(session: &ChatSession, command: (&str, &str)) -> Result<()> {
    match command {
        ("/new", _) => {
            session.new_chat().await?;
            println!("🆕 New chat started\n");
            print_suggestions();
        }
        ("/history", _) => list_conversations(session).await?,
        ("/open", id) => match id.parse::<i64>() {
            Ok(id) => {
                report_load(session.switch_conversation(ConversationId(id)).await?);
                print_transcript(&session.snapshot().messages);
            }
            Err(_) => println!("Usage: /open <conversation id>"),
        },
        ("/delete", id) => match id.parse::<i64>() {
            Ok(id) => delete_conversation(session, ConversationId(id)).await?,
            Err(_) => println!("Usage: /delete <conversation id>"),
        },
        _ => {}
    }
    Ok(())
}

async fn list_conversations(session: &ChatSession) -> Result<()> {
    let conversations = session.conversations().await?;

    println!("\n💬 Conversations");
    println!("═══════════════════════════════════════");
    if conversations.is_empty() {
        println!("No conversations yet.");
    }
    for conversation in &conversations {
        let marker = if session.conversation_id() == Some(conversation.conversation_id) {
            "▶"
        } else {
            " "
        };
        println!(
            "{marker} [{}] {} {}",
            conversation.conversation_id,
            conversation.title.as_deref().unwrap_or("Untitled"),
            conversation.updated_at.as_deref().unwrap_or_default()
        );
    }
    println!();
    Ok(())
}

async fn show_conversation(app: &App, id: ConversationId) -> Result<()> {
    let session = app.chat_session();
    report_load(session.switch_conversation(id).await?);
    print_transcript(&session.snapshot().messages);
    Ok(())
}

async fn delete_conversation(session: &ChatSession, id: ConversationId) -> Result<()> {
    if session.delete_conversation(id).await? {
        println!("🗑️  Deleted conversation {id}; started a new chat");
    } else {
        println!("🗑️  Deleted conversation {id}");
    }
    Ok(())
}

async fn leave(app: &App, action: LeaveCommand) -> Result<()> {
    let service = app.leave_service();

    match action {
        LeaveCommand::Balance => {
            let summary = service.dashboard().await?;
            println!("\n🗓️  Leave Balance");
            println!("═══════════════════════════════════════");
            for (leave_type, balance) in &summary.balances {
                println!(
                    "{:<16} {:>5} / {:<5} ({} left)",
                    leave_type.label(),
                    balance.used_days,
                    balance.total_days,
                    balance.remaining()
                );
            }
            println!(
                "\nTotal remaining: {} day(s), {} request(s) on file",
                summary.total_remaining, summary.request_count
            );
        }
        LeaveCommand::History => {
            let history = service.combined_history().await?;
            println!("\n📋 Leave Requests");
            println!("═══════════════════════════════════════");
            if history.is_empty() {
                println!("No leave requests yet.");
            }
            for entry in &history {
                println!(
                    "{:<16} {:>3} day(s)  {}  {}",
                    entry.leave_type.label(),
                    entry.record.used_days,
                    entry.record.created_at.as_deref().unwrap_or("-"),
                    entry.record.reason
                );
            }
        }
        LeaveCommand::Apply {
            leave_type,
            days,
            reason,
        } => {
            let form = LeaveForm {
                leave_type: LeaveType::parse(&leave_type),
                days,
                reason,
            };
            let request = service.apply(&form).await?;
            println!(
                "✅ Leave request submitted: {} day(s) of {}",
                request.used_days,
                form.leave_type.map(|t| t.label()).unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn report_load(outcome: LoadOutcome) {
    if outcome == LoadOutcome::Failed {
        println!("⚠️  Could not load this conversation. Try /open again later.");
    }
}

fn print_transcript(messages: &[Message]) {
    if messages.is_empty() {
        print_suggestions();
        return;
    }
    for message in messages {
        print_message(message);
    }
    println!();
}

fn print_message(message: &Message) {
    match message.sender {
        Sender::User => println!("You> {}  ({})", message.text, message.time),
        Sender::Assistant if message.is_error => println!("Aiva> ❌ {}", message.text),
        Sender::Assistant => println!(
            "Aiva> {}  ({})",
            MessageFormatter::format(&message.text),
            message.time
        ),
    }
}

fn print_suggestions() {
    println!("Try asking:");
    for prompt in SUGGESTED_PROMPTS {
        println!("  • {prompt}");
    }
    println!();
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hrconnect_conversation::MemoryStore;
    use hrconnect_core::{ChatBackend, ConversationDetail, HistoryList, HrError, QueryResponse};

    /// Backend whose conversation endpoints all fail.
    struct UnavailableBackend;

    #[async_trait]
    impl ChatBackend for UnavailableBackend {
        async fn query(
            &self,
            _question: &str,
            _conversation_id: Option<ConversationId>,
        ) -> hrconnect_core::Result<QueryResponse> {
            Ok(QueryResponse {
                answer: "still here".into(),
                conversation_id: None,
            })
        }

        async fn get_conversation(
            &self,
            _id: ConversationId,
        ) -> hrconnect_core::Result<ConversationDetail> {
            Err(HrError::Network("connection refused".into()))
        }

        async fn history(&self) -> hrconnect_core::Result<HistoryList> {
            Err(HrError::Network("connection refused".into()))
        }

        async fn delete_conversation(&self, _id: ConversationId) -> hrconnect_core::Result<()> {
            Err(HrError::Api {
                status: 404,
                message: "Conversation not found".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_command_errors_leave_the_chat_usable() {
        let session = ChatSession::open(
            Arc::new(UnavailableBackend),
            ChatStorage::new(Arc::new(MemoryStore::new())),
            SessionOptions::default(),
        );

        let err = run_command(&session, ("/delete", "99")).await.unwrap_err();
        assert!(err.to_string().contains("Conversation not found"));
        assert!(run_command(&session, ("/history", "")).await.is_err());
        assert!(run_command(&session, ("/open", "abc")).await.is_ok());

        assert!(matches!(session.send("hello").await, SendOutcome::Replied(_)));
    }
}
