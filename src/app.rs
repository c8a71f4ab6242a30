use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use crate::api;
use crate::config::{self, Config};
use crate::data::{self, AuthService, CommentService, FeedService, PostService, VoteService};
use crate::launch::{self, InitData, LaunchParams, Route};
use crate::logging;
use crate::model::{Audience, Comment, Post, SortType};
use crate::pager::{FeedPager, FeedQuery};
use crate::resolver::{Location, RouteParams};
use crate::session::{self, Session};
use crate::storage;
use crate::text;
use crate::thread::{self, Thread};
use crate::vote::{BaselinePolicy, SupportToggle, VoteTarget};

const WRAP_WIDTH: usize = 78;

#[derive(Debug, Parser)]
#[command(name = "toxiq", version, about = "Toxiq: read and join the Toxiq feed from the terminal")]
pub struct Cli {
    /// Config file (defaults to <config dir>/toxiq/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Serve sample data instead of talking to the backend
    #[arg(long, global = true)]
    pub offline: bool,

    /// Raw Telegram init data used to log in when no token is stored
    #[arg(long, global = true, env = "TOXIQ_INIT_DATA", hide_env_values = true)]
    pub init_data: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Exchange Telegram init data for a session token
    Login {
        /// Mini App launch URL carrying `tgWebAppData` in its fragment
        #[arg(long)]
        launch_url: Option<String>,
    },
    /// Print the feed
    Feed {
        #[arg(long)]
        audience: Option<Audience>,
        #[arg(long)]
        sort: Option<SortType>,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Print a post with its comments
    Post { id: String },
    /// Resolve a Mini App launch URL and show where it lands
    Open {
        url: String,
        /// Post id taken from the in-app route
        #[arg(long)]
        route_param: Option<String>,
        /// Start parameter reported by the Telegram SDK
        #[arg(long)]
        start_param: Option<String>,
    },
    /// Toggle a like or dislike on a post
    Vote {
        post_id: String,
        #[arg(value_enum)]
        direction: Direction,
    },
    /// Comment on a post, or reply to a comment
    Comment {
        post_id: String,
        text: String,
        #[arg(long)]
        reply_to: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

struct Services {
    session: Arc<Session>,
    auth: Arc<dyn AuthService>,
    feed: Arc<dyn FeedService>,
    posts: Arc<dyn PostService>,
    comments: Arc<dyn CommentService>,
    votes: Arc<dyn VoteService>,
}

impl Services {
    fn offline() -> Result<Self> {
        let store = Arc::new(storage::Store::open_in_memory().context("open storage")?);
        Ok(Self {
            session: Arc::new(Session::restore(store).context("restore session")?),
            auth: Arc::new(data::MockAuthService),
            feed: Arc::new(data::MockFeedService),
            posts: Arc::new(data::MockPostService),
            comments: Arc::new(data::MockCommentService::default()),
            votes: Arc::new(data::MockVoteService),
        })
    }

    fn online(cfg: &Config) -> Result<Self> {
        let store = Arc::new(
            storage::Store::open(storage::Options {
                path: cfg.storage.path.clone(),
            })
            .context("open storage")?,
        );
        let session = Arc::new(Session::restore(store).context("restore session")?);
        let client = Arc::new(
            api::Client::new(
                session.clone(),
                api::ClientConfig {
                    user_agent: cfg.api.user_agent.clone(),
                    base_url: Some(cfg.api.base_url.clone()),
                    timeout: Some(cfg.api.timeout),
                    http_client: None,
                },
            )
            .context("create api client")?,
        );
        Ok(Self {
            session,
            auth: Arc::new(data::ApiAuthService::new(client.clone())),
            feed: Arc::new(data::ApiFeedService::new(client.clone())),
            posts: Arc::new(data::ApiPostService::new(client.clone())),
            comments: Arc::new(data::ApiCommentService::new(client.clone())),
            votes: Arc::new(data::ApiVoteService::new(client)),
        })
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: cli.config.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    logging::init(&cfg.logging.filter)?;

    let services = if cli.offline {
        Services::offline()?
    } else {
        Services::online(&cfg)?
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Login { launch_url } => {
            let init_data = match launch_url {
                Some(url) => launch_init_data(&url)?.or(cli.init_data),
                None => cli.init_data,
            };
            if let Some(raw) = init_data.as_deref() {
                describe_init_data(raw);
            }
            let profile = session::login(services.auth.as_ref(), &services.session, init_data.as_deref())?;
            match profile {
                Some(profile) => writeln!(out, "Logged in as {} (@{})", profile.name, profile.user_name)?,
                None => writeln!(out, "Logged in")?,
            }
        }
        Command::Feed {
            audience,
            sort,
            pages,
        } => {
            authenticate(&services, cli.init_data.as_deref())?;
            let mut query = cfg.feed.query()?;
            if let Some(audience) = audience {
                query.audience = audience;
            }
            if let Some(sort) = sort {
                query.sort = sort;
            }
            show_feed(&mut out, &services, query, cfg.feed.page_size, pages)?;
        }
        Command::Post { id } => {
            authenticate(&services, cli.init_data.as_deref())?;
            show_post(&mut out, &services, &id, &cfg.api.share_base)?;
        }
        Command::Open {
            url,
            route_param,
            start_param,
        } => {
            let location = Location::parse(&url).with_context(|| format!("parse url {url}"))?;
            let mut launch_params = LaunchParams::from_location(&location);
            if start_param.is_some() {
                launch_params.start_param = start_param;
            }
            let route_params = RouteParams {
                post_id: route_param,
            };
            let init_data = launch_params.init_data.clone().or(cli.init_data);
            authenticate(&services, init_data.as_deref())?;

            match launch::route(&location, &route_params, &launch_params) {
                Route::Post { id, source } => {
                    writeln!(out, "Opening post {id} ({source})\n")?;
                    show_post(&mut out, &services, id.as_str(), &cfg.api.share_base)?;
                }
                Route::Home => {
                    writeln!(out, "No post in launch link, showing the feed\n")?;
                    show_feed(&mut out, &services, cfg.feed.query()?, cfg.feed.page_size, 1)?;
                }
            }
        }
        Command::Vote { post_id, direction } => {
            authenticate(&services, cli.init_data.as_deref())?;
            let post = services.posts.get_post(&post_id)?;
            let mut toggle = SupportToggle::new(
                VoteTarget::post(post.id.clone()),
                post.support_status,
                post.support_count,
            )
            .with_policy(BaselinePolicy::Confirmed);
            let status = match direction {
                Direction::Up => toggle.toggle_upvote(services.votes.as_ref())?,
                Direction::Down => toggle.toggle_downvote(services.votes.as_ref())?,
            };
            writeln!(out, "{} is now {status:?} ({} support)", post.id, toggle.count())?;
        }
        Command::Comment {
            post_id,
            text,
            reply_to,
        } => {
            authenticate(&services, cli.init_data.as_deref())?;
            let mut thread =
                Thread::load(&post_id, services.posts.as_ref(), services.comments.as_ref())?;
            let created = thread.submit(services.comments.as_ref(), &text, reply_to.as_deref())?;
            let label = if created.id.is_empty() {
                "Posted comment".to_string()
            } else {
                format!("Posted comment {}", created.id)
            };
            writeln!(
                out,
                "{label} ({} comments)\n{}",
                thread.post.comment_count,
                thread::share_url(&cfg.api.share_base, &thread.post.id)
            )?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Logs in with `init_data` when no token is stored. Missing init data is
/// not an error here; requests then go out anonymously.
fn authenticate(services: &Services, init_data: Option<&str>) -> Result<()> {
    if services.session.is_authenticated() || init_data.is_none() {
        return Ok(());
    }
    session::ensure_login(services.auth.as_ref(), &services.session, init_data)?;
    Ok(())
}

fn launch_init_data(url: &str) -> Result<Option<String>> {
    let location = Location::parse(url).with_context(|| format!("parse launch url {url}"))?;
    Ok(LaunchParams::from_location(&location).init_data)
}

fn describe_init_data(raw: &str) {
    match InitData::parse(raw) {
        Ok(init) => {
            let user = init.display_name().unwrap_or_else(|| "unknown".into());
            tracing::debug!(user = %user, "telegram init data");
        }
        Err(err) => tracing::warn!(error = %err, "init data could not be read locally"),
    }
}

fn show_feed(
    out: &mut dyn Write,
    services: &Services,
    query: FeedQuery,
    page_size: u32,
    pages: u32,
) -> Result<()> {
    let mut pager = FeedPager::new(query, page_size);
    let mut request = pager.start();
    for _ in 0..pages.max(1) {
        let Some(current) = request.take() else {
            break;
        };
        pager.fetch(services.feed.as_ref(), &current);
        if let Some(err) = pager.initial_error() {
            bail!("{err}");
        }
        if let Some(err) = pager.more_error() {
            tracing::warn!(error = %err, "stopping after partial feed");
            break;
        }
        request = pager.load_more();
    }

    if pager.posts().is_empty() {
        writeln!(out, "No posts yet.")?;
        return Ok(());
    }
    let now = Utc::now();
    for post in pager.posts() {
        writeln!(out, "{}", render_post(post, now))?;
    }
    if !pager.has_more() {
        writeln!(out, "(end of feed)")?;
    }
    Ok(())
}

fn show_post(out: &mut dyn Write, services: &Services, id: &str, share_base: &str) -> Result<()> {
    let thread = Thread::load(id, services.posts.as_ref(), services.comments.as_ref())?;
    let now = Utc::now();

    if let Some(preview) = thread::reply_preview(&thread.post, services.posts.as_ref()) {
        writeln!(
            out,
            "> {}: {}",
            preview.user_name,
            text::plain(&preview.content)
        )?;
    }
    writeln!(out, "{}", render_post(&thread.post, now))?;
    writeln!(out, "{}\n", thread::share_url(share_base, &thread.post.id))?;

    for comment in &thread.comments {
        writeln!(out, "{}", render_comment(comment, now, ""))?;
        for reply in &comment.replies {
            writeln!(out, "{}", render_comment(reply, now, "    "))?;
        }
    }
    Ok(())
}

fn when(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    created
        .map(|then| text::relative_time(then, now))
        .unwrap_or_default()
}

fn render_post(post: &Post, now: DateTime<Utc>) -> String {
    let author = if post.name.is_empty() {
        format!("@{}", post.user_name)
    } else {
        format!("{} (@{})", post.name, post.user_name)
    };
    let mut rendered = format!("{author}  {}\n", when(post.created_at(), now));
    let options = textwrap::Options::new(WRAP_WIDTH)
        .initial_indent("  ")
        .subsequent_indent("  ");
    rendered.push_str(&textwrap::fill(&text::plain(&post.content), options));
    if let Some(media) = post.media_path() {
        rendered.push_str(&format!("\n  [media] {media}"));
    }
    rendered.push_str(&format!(
        "\n  {:+} support | {} comments | {}\n",
        post.support_count, post.comment_count, post.id
    ));
    rendered
}

fn render_comment(comment: &Comment, now: DateTime<Utc>, indent: &str) -> String {
    let body_indent = format!("{indent}  ");
    let options = textwrap::Options::new(WRAP_WIDTH)
        .initial_indent(&body_indent)
        .subsequent_indent(&body_indent);
    format!(
        "{indent}@{}  {}  [{}]\n{}",
        comment.user_name,
        when(comment.created_at(), now),
        comment.id,
        textwrap::fill(&text::hashtag_mentions(&comment.content), options)
    )
}
