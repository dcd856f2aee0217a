//! GENIE Connect CLI - browse and post to the community board from a terminal
//!
//! Usage: genie-cli [OPTIONS] <COMMAND>
//!
//! Works directly against the local database. `--json` prints machine-readable
//! output for scripting.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use genie_connect_lib::ai_client::AssistantClient;
use genie_connect_lib::comments::{self, CommentNode, NewComment};
use genie_connect_lib::db::{Database, Post, PostFilter};
use genie_connect_lib::posts::{self, NewPost, PostCard};
use genie_connect_lib::settings::{self, StoredProfile};
use genie_connect_lib::utils::{now_millis, safe_truncate, time_ago};
use genie_connect_lib::{hashtags, profiles, reactions, resources};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Main CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "genie-cli")]
#[command(version, about = "GENIE Connect community CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Database path (default: auto-detect)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Output as JSON for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Detailed logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage your profile
    Profile {
        #[command(subcommand)]
        cmd: ProfileCommands,
    },
    /// Create, browse and delete posts
    Post {
        #[command(subcommand)]
        cmd: PostCommands,
    },
    /// Comment on a post or reply to a comment
    Comment {
        /// Post ID
        post_id: i64,
        /// Comment text
        content: String,
        /// Reply to this comment ID
        #[arg(long)]
        reply_to: Option<i64>,
    },
    /// Toggle like on a post (or a comment with --comment)
    Like {
        /// Post ID, or comment ID with --comment
        id: i64,
        #[arg(long)]
        comment: bool,
    },
    /// Toggle "helpful" on a post
    Helpful {
        /// Post ID
        post_id: i64,
    },
    /// Trending hashtags
    Hashtags {
        #[arg(long, short, default_value = "20")]
        limit: u32,
    },
    /// Curated reading list
    Resources {
        /// Only show resources with this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Ask the GENIE AI assistant
    Ask {
        /// Your question
        question: String,
    },
    /// Settings
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Create a profile and make it the current one
    Create {
        #[arg(long)]
        nickname: String,
        #[arg(long, default_value = "🦊")]
        avatar: String,
    },
    /// Show a profile (default: current)
    Show {
        id: Option<i64>,
    },
    /// Edit the current profile
    Edit {
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Activity stats for a profile (default: current)
    Stats {
        id: Option<i64>,
    },
    /// Forget the current profile on this machine
    Logout,
}

#[derive(Subcommand)]
enum PostCommands {
    /// Publish a post as the current profile
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// Hashtag (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,
        /// Hide your name and avatar
        #[arg(long)]
        anonymous: bool,
    },
    /// Feed, newest first
    List {
        #[arg(long)]
        hashtag: Option<String>,
        /// Full-text search
        #[arg(long, short)]
        search: Option<String>,
        /// Only posts by the current profile
        #[arg(long)]
        mine: bool,
        #[arg(long, short, default_value = "20")]
        limit: u32,
    },
    /// Show a post with its comment thread
    Show {
        id: i64,
    },
    /// Delete one of your posts
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Store the Gemini API key
    SetKey {
        key: String,
    },
    /// Remove the stored Gemini API key
    ClearKey,
    /// Pin the database path (omit PATH to go back to auto-detect)
    SetDb {
        path: Option<String>,
    },
    /// Show current settings
    Show,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    // Ignore SIGPIPE so piping through head/tail doesn't kill the process.
    #[cfg(unix)]
    unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN); }

    // println! panics on a closed pipe even with SIGPIPE ignored; exit quietly instead.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if info.to_string().contains("Broken pipe") {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> Result<(), String> {
    // Settings first (needed for custom db path and the current profile)
    settings::init(settings::app_data_dir());

    // Commands that never touch the database
    match &cli.command {
        Commands::Completions { shell } => {
            generate(*shell, &mut Cli::command(), "genie-cli", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Resources { tag } => return handle_resources(tag.as_deref(), cli.json),
        Commands::Ask { question } => return handle_ask(question, cli.json).await,
        Commands::Config { cmd } => return handle_config(cmd, cli.json),
        _ => {}
    }

    let db_path = settings::find_database(cli.db.as_deref());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    tracing::debug!("Using database: {}", db_path.display());
    let db = Database::new(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;

    match cli.command {
        Commands::Profile { cmd } => handle_profile(cmd, &db, cli.json),
        Commands::Post { cmd } => handle_post(cmd, &db, cli.json),
        Commands::Comment { post_id, content, reply_to } => handle_comment(post_id, content, reply_to, &db, cli.json),
        Commands::Like { id, comment } => handle_like(id, comment, &db, cli.json),
        Commands::Helpful { post_id } => handle_helpful(post_id, &db, cli.json),
        Commands::Hashtags { limit } => handle_hashtags(limit, &db, cli.json),
        Commands::Completions { .. }
        | Commands::Resources { .. }
        | Commands::Ask { .. }
        | Commands::Config { .. } => unreachable!(),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn current_profile() -> Result<StoredProfile, String> {
    settings::get_stored_profile()
        .ok_or_else(|| "No current profile. Run `genie-cli profile create --nickname <name>` first.".to_string())
}

fn print_card(card: &PostCard) {
    let avatar = card.avatar_emoji.as_deref().unwrap_or("👤");
    println!("#{} {} {} · {}", card.id, avatar, card.name, card.time_ago);
    println!("  {}", card.title);
    println!("  {}", card.snippet);
    if !card.hashtags.is_empty() {
        let tags: Vec<String> = card.hashtags.iter().map(|t| format!("#{}", t)).collect();
        println!("  {}", tags.join(" "));
    }
    println!("  ♥ {}  ✓ {}  💬 {}", card.likes, card.helpful, card.comment_count);
}

fn print_thread(nodes: &[CommentNode], indent: usize, now: i64) {
    for node in nodes {
        let c = &node.comment;
        let (name, avatar) = c.author.as_ref()
            .map(|a| (a.nickname.as_str(), a.avatar_emoji.as_str()))
            .unwrap_or((posts::ANONYMOUS_NAME, "👤"));
        let pad = "  ".repeat(indent + 1);
        println!("{}[{}] {} {} · {} · ♥ {}", pad, c.id, avatar, name, time_ago(c.created_at, now), c.likes_count);
        println!("{}  {}", pad, safe_truncate(&c.content, 500));
        print_thread(&node.children, indent + 1, now);
    }
}

fn to_cards(posts: &[Post]) -> Vec<PostCard> {
    let now = now_millis();
    posts.iter().map(|p| PostCard::from_post(p, now)).collect()
}

// ============================================================================
// Profile Commands
// ============================================================================

fn handle_profile(cmd: ProfileCommands, db: &Database, json: bool) -> Result<(), String> {
    match cmd {
        ProfileCommands::Create { nickname, avatar } => {
            let profile = profiles::create_profile(db, &nickname, &avatar).map_err(|e| e.to_string())?;
            settings::store_profile(StoredProfile::from(&profile)).map_err(|e| e.to_string())?;
            if json {
                print_json(&profile)?;
            } else {
                println!("Welcome, {} {}! (profile #{})", profile.avatar_emoji, profile.nickname, profile.id);
            }
        }
        ProfileCommands::Show { id } => {
            let id = match id {
                Some(id) => id,
                None => current_profile()?.id,
            };
            let profile = profiles::get_profile(db, id).map_err(|e| e.to_string())?;
            if json {
                print_json(&profile)?;
            } else {
                println!("{} {} (#{})", profile.avatar_emoji, profile.nickname, profile.id);
                println!("Joined {}", time_ago(profile.created_at, now_millis()));
            }
        }
        ProfileCommands::Edit { nickname, avatar } => {
            let current = current_profile()?;
            let existing = profiles::get_profile(db, current.id).map_err(|e| e.to_string())?;
            let nickname = nickname.unwrap_or(existing.nickname);
            let avatar = avatar.unwrap_or(existing.avatar_emoji);
            let profile = profiles::update_profile(db, current.id, &nickname, &avatar).map_err(|e| e.to_string())?;
            settings::store_profile(StoredProfile::from(&profile)).map_err(|e| e.to_string())?;
            if json {
                print_json(&profile)?;
            } else {
                println!("Updated: {} {}", profile.avatar_emoji, profile.nickname);
            }
        }
        ProfileCommands::Stats { id } => {
            let id = match id {
                Some(id) => id,
                None => current_profile()?.id,
            };
            let stats = profiles::user_stats(db, id).map_err(|e| e.to_string())?;
            if json {
                print_json(&stats)?;
            } else {
                println!("Posts:    {}", stats.posts);
                println!("Likes:    {}", stats.likes);
                println!("Comments: {}", stats.comments);
                println!("Helpful:  {}", stats.helpful);
            }
        }
        ProfileCommands::Logout => {
            settings::clear_profile().map_err(|e| e.to_string())?;
            if json {
                println!(r#"{{"status":"ok"}}"#);
            } else {
                println!("Logged out. Your posts stay on the board.");
            }
        }
    }
    Ok(())
}

// ============================================================================
// Post Commands
// ============================================================================

fn handle_post(cmd: PostCommands, db: &Database, json: bool) -> Result<(), String> {
    match cmd {
        PostCommands::Create { title, content, tags, anonymous } => {
            let author = current_profile()?;
            let post = posts::create_post(db, NewPost {
                author_id: author.id,
                title,
                content,
                hashtags: tags,
                is_anonymous: anonymous,
            }).map_err(|e| e.to_string())?;
            let card = PostCard::from_post(&post, now_millis());
            if json {
                print_json(&card)?;
            } else {
                println!("Posted:");
                print_card(&card);
            }
        }
        PostCommands::List { hashtag, search, mine, limit } => {
            let author_id = if mine { Some(current_profile()?.id) } else { None };
            let filter = PostFilter { hashtag, query: search, author_id, limit: Some(limit) };
            let list = posts::fetch_posts(db, &filter).map_err(|e| e.to_string())?;
            let cards = to_cards(&list);
            if json {
                print_json(&cards)?;
            } else if cards.is_empty() {
                println!("No posts yet.");
            } else {
                for card in &cards {
                    print_card(card);
                    println!();
                }
            }
        }
        PostCommands::Show { id } => {
            let post = posts::fetch_post(db, id).map_err(|e| e.to_string())?;
            let thread = comments::fetch_comment_tree(db, id).map_err(|e| e.to_string())?;
            let card = PostCard::from_post(&post, now_millis());
            if json {
                print_json(&serde_json::json!({ "post": card, "comments": thread }))?;
            } else {
                print_card(&card);
                println!();
                println!("{}", card.content);
                println!();
                println!("Comments ({}):", comments::count_replies(&thread));
                print_thread(&thread, 0, now_millis());
            }
        }
        PostCommands::Delete { id } => {
            let requester = current_profile()?;
            posts::delete_post(db, id, requester.id).map_err(|e| e.to_string())?;
            if json {
                println!(r#"{{"deleted":{}}}"#, id);
            } else {
                println!("Deleted post #{}", id);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Comments & Reactions
// ============================================================================

fn handle_comment(post_id: i64, content: String, reply_to: Option<i64>, db: &Database, json: bool) -> Result<(), String> {
    let author = current_profile()?;
    let comment = comments::create_comment(db, NewComment {
        post_id,
        parent_id: reply_to,
        author_id: author.id,
        content,
    }).map_err(|e| e.to_string())?;

    if json {
        print_json(&comment)?;
    } else {
        println!("Comment #{} added to post #{}", comment.id, post_id);
    }
    Ok(())
}

fn handle_like(id: i64, comment: bool, db: &Database, json: bool) -> Result<(), String> {
    let profile = current_profile()?;
    let result = if comment {
        reactions::toggle_comment_like(db, id, profile.id)
    } else {
        reactions::toggle_like(db, id, profile.id)
    };
    let state = result.map_err(|e| e.to_string())?;

    if json {
        print_json(&state)?;
    } else {
        let verb = if state.active { "Liked" } else { "Unliked" };
        let target = if comment { "comment" } else { "post" };
        println!("{} {} #{} ({} likes)", verb, target, id, state.count);
    }
    Ok(())
}

fn handle_helpful(post_id: i64, db: &Database, json: bool) -> Result<(), String> {
    let profile = current_profile()?;
    let state = reactions::toggle_helpful(db, post_id, profile.id).map_err(|e| e.to_string())?;
    if json {
        print_json(&state)?;
    } else {
        let verb = if state.active { "Marked" } else { "Unmarked" };
        println!("{} post #{} as helpful ({} total)", verb, post_id, state.count);
    }
    Ok(())
}

// ============================================================================
// Hashtags, Resources, Assistant
// ============================================================================

fn handle_hashtags(limit: u32, db: &Database, json: bool) -> Result<(), String> {
    let cloud = hashtags::word_cloud(db, limit).map_err(|e| e.to_string())?;
    if json {
        return print_json(&cloud);
    }
    if cloud.is_empty() {
        println!("No hashtags yet.");
    }
    for item in &cloud {
        println!("#{:<30} {:>4}  {:?}", item.tag, item.count, item.tier);
    }
    Ok(())
}

fn handle_resources(tag: Option<&str>, json: bool) -> Result<(), String> {
    let list = match tag {
        Some(tag) => resources::by_tag(tag),
        None => resources::all().to_vec(),
    };
    if json {
        return print_json(&list);
    }
    for r in &list {
        println!("[{}] {}", r.tag, r.title);
        println!("  {} · {}", r.source, r.url);
    }
    Ok(())
}

async fn handle_ask(question: &str, json: bool) -> Result<(), String> {
    let client = AssistantClient::from_settings().map_err(|e| e.to_string())?;
    let answer = client.ask(question).await.map_err(|e| e.to_string())?;
    if json {
        print_json(&serde_json::json!({ "answer": answer }))
    } else {
        println!("{}", answer);
        Ok(())
    }
}

// ============================================================================
// Config
// ============================================================================

fn handle_config(cmd: &ConfigCommands, json: bool) -> Result<(), String> {
    match cmd {
        ConfigCommands::SetKey { key } => {
            settings::set_api_key(key.trim().to_string()).map_err(|e| e.to_string())?;
            if json {
                println!(r#"{{"status":"ok"}}"#);
            } else {
                println!("Gemini API key saved");
            }
        }
        ConfigCommands::ClearKey => {
            settings::set_api_key(String::new()).map_err(|e| e.to_string())?;
            if json {
                println!(r#"{{"status":"ok"}}"#);
            } else {
                println!("Gemini API key cleared");
            }
        }
        ConfigCommands::SetDb { path } => {
            settings::set_custom_db_path(path.clone()).map_err(|e| e.to_string())?;
            if json {
                println!(r#"{{"status":"ok"}}"#);
            } else {
                match path {
                    Some(p) => println!("Database pinned to {}", p),
                    None => println!("Database path back to auto-detect"),
                }
            }
        }
        ConfigCommands::Show => {
            let current = settings::current();
            let key = settings::get_masked_api_key();
            let profile = settings::get_stored_profile();
            if json {
                print_json(&serde_json::json!({
                    "gemini_api_key": key,
                    "gemini_model": current.gemini_model,
                    "gemini_base_url": current.gemini_base_url,
                    "ai_requests_per_minute": current.ai_requests_per_minute,
                    "current_profile": profile,
                    "custom_db_path": current.custom_db_path,
                }))?;
            } else {
                println!("gemini-api-key:          {}", key.as_deref().unwrap_or("not set"));
                println!("gemini-model:            {}", current.gemini_model);
                println!("gemini-base-url:         {}", current.gemini_base_url);
                println!("ai-requests-per-minute:  {}", current.ai_requests_per_minute);
                println!("current-profile:         {}", profile.map(|p| format!("{} {} (#{})", p.avatar_emoji, p.nickname, p.id)).unwrap_or_else(|| "none".to_string()));
                println!("database:                {}", settings::find_database(None).display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "genie-cli", "post", "show", "4", "--db", "/tmp/g.db", "--json",
        ]).expect("should parse global flags after the subcommand");
        assert_eq!(cli.db.as_deref(), Some("/tmp/g.db"));
        assert!(cli.json);
        assert!(!cli.verbose);
        match cli.command {
            Commands::Post { cmd: PostCommands::Show { id } } => assert_eq!(id, 4),
            _ => panic!("expected Post > Show"),
        }
    }

    #[test]
    fn test_post_create_repeatable_tags() {
        let cli = Cli::try_parse_from([
            "genie-cli", "post", "create", "--title", "Pay gap", "--content", "Thoughts?",
            "-t", "career", "--tag", "PayGap", "--anonymous",
        ]).expect("should parse repeated tags");
        match cli.command {
            Commands::Post { cmd: PostCommands::Create { title, tags, anonymous, .. } } => {
                assert_eq!(title, "Pay gap");
                assert_eq!(tags, vec!["career".to_string(), "PayGap".to_string()]);
                assert!(anonymous);
            }
            _ => panic!("expected Post > Create"),
        }
    }

    #[test]
    fn test_post_create_requires_title() {
        assert!(Cli::try_parse_from(["genie-cli", "post", "create", "--content", "x"]).is_err());
    }

    #[test]
    fn test_post_list_defaults() {
        let cli = Cli::try_parse_from(["genie-cli", "post", "list"]).expect("should parse");
        match cli.command {
            Commands::Post { cmd: PostCommands::List { hashtag, search, mine, limit } } => {
                assert_eq!(limit, 20);
                assert!(hashtag.is_none());
                assert!(search.is_none());
                assert!(!mine);
            }
            _ => panic!("expected Post > List"),
        }
    }

    #[test]
    fn test_post_list_filters() {
        let cli = Cli::try_parse_from([
            "genie-cli", "post", "list", "--hashtag", "career", "-s", "mentor", "-l", "5", "--mine",
        ]).expect("should parse filters");
        match cli.command {
            Commands::Post { cmd: PostCommands::List { hashtag, search, mine, limit } } => {
                assert_eq!(hashtag.as_deref(), Some("career"));
                assert_eq!(search.as_deref(), Some("mentor"));
                assert!(mine);
                assert_eq!(limit, 5);
            }
            _ => panic!("expected Post > List"),
        }
    }

    #[test]
    fn test_hashtags_default_limit() {
        let cli = Cli::try_parse_from(["genie-cli", "hashtags"]).expect("should parse");
        match cli.command {
            Commands::Hashtags { limit } => assert_eq!(limit, 20),
            _ => panic!("expected Hashtags"),
        }
    }

    #[test]
    fn test_like_comment_flag() {
        let cli = Cli::try_parse_from(["genie-cli", "like", "12", "--comment"]).expect("should parse");
        match cli.command {
            Commands::Like { id, comment } => {
                assert_eq!(id, 12);
                assert!(comment);
            }
            _ => panic!("expected Like"),
        }

        let cli = Cli::try_parse_from(["genie-cli", "like", "12"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Like { comment: false, .. }));
    }

    #[test]
    fn test_comment_reply_to() {
        let cli = Cli::try_parse_from([
            "genie-cli", "comment", "3", "Same here", "--reply-to", "8",
        ]).expect("should parse --reply-to");
        match cli.command {
            Commands::Comment { post_id, content, reply_to } => {
                assert_eq!(post_id, 3);
                assert_eq!(content, "Same here");
                assert_eq!(reply_to, Some(8));
            }
            _ => panic!("expected Comment"),
        }
    }

    #[test]
    fn test_comment_rejects_non_numeric_post() {
        assert!(Cli::try_parse_from(["genie-cli", "comment", "abc", "hi"]).is_err());
    }

    #[test]
    fn test_config_set_db_path_is_optional() {
        let cli = Cli::try_parse_from(["genie-cli", "config", "set-db"]).expect("should parse without a path");
        assert!(matches!(cli.command, Commands::Config { cmd: ConfigCommands::SetDb { path: None } }));

        let cli = Cli::try_parse_from(["genie-cli", "config", "set-db", "/data/genie.db"]).expect("should parse a path");
        match cli.command {
            Commands::Config { cmd: ConfigCommands::SetDb { path } } => {
                assert_eq!(path.as_deref(), Some("/data/genie.db"));
            }
            _ => panic!("expected Config > SetDb"),
        }
    }

    #[test]
    fn test_profile_create_default_avatar() {
        let cli = Cli::try_parse_from(["genie-cli", "-v", "profile", "create", "--nickname", "ada"]).expect("should parse");
        assert!(cli.verbose);
        match cli.command {
            Commands::Profile { cmd: ProfileCommands::Create { nickname, avatar } } => {
                assert_eq!(nickname, "ada");
                assert_eq!(avatar, "🦊");
            }
            _ => panic!("expected Profile > Create"),
        }
    }

    #[test]
    fn test_resources_tag_and_completions() {
        let cli = Cli::try_parse_from(["genie-cli", "resources", "--tag", "Leadership"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Resources { tag: Some(ref t) } if t == "Leadership"));

        let cli = Cli::try_parse_from(["genie-cli", "completions", "bash"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Completions { shell: Shell::Bash }));
    }
}
