use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context};
use briefsmith::{
    brief::{self, DeadlineUnit, GeneratorFormData},
    catalog,
    export::{self, ExportFormat},
    identity::{self, Identity},
    service::BriefService,
    types::{PaymentTier, Profile, Role},
};
use clap::Parser;

const DEVICE_ID_FILE: &str = "device_id";

#[derive(Parser, Debug)]
struct Cli {
    /// Working directory, with config and data files.
    #[clap(short, long, default_value = "data")]
    dir: PathBuf,

    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(clap::Args, Debug)]
struct Who {
    /// Act as this user. Without it, as this machine's device.
    #[clap(short, long)]
    user: Option<String>,
}

impl Who {
    fn identity(&self) -> anyhow::Result<Identity> {
        match &self.user {
            Some(uid) => Ok(Identity::User(uid.clone())),
            None => {
                let id = identity::load_or_create_device_id(DEVICE_ID_FILE)?;
                Ok(Identity::Device(id))
            }
        }
    }
}

#[derive(clap::Args, Debug)]
struct Form {
    #[clap(long)]
    category: String,

    #[clap(long)]
    niche: String,

    #[clap(long)]
    industry: String,

    /// Repeatable.
    #[clap(short, long = "keyword")]
    keywords: Vec<String>,

    /// Deadline amount. Left to the model when absent.
    #[clap(long)]
    deadline: Option<u32>,

    #[clap(long, default_value = "days")]
    unit: DeadlineUnit,
}

impl From<&Form> for GeneratorFormData {
    fn from(form: &Form) -> Self {
        Self {
            category: form.category.clone(),
            niche: form.niche.clone(),
            industry: form.industry.clone(),
            keywords: form.keywords.clone(),
            deadline: brief::deadline(form.deadline, form.unit),
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Cmd {
    /// Serve the HTTP API.
    Server,

    /// Issue a user token signed with the configured secret.
    Jwt {
        uid: String,

        /// Lifetime in seconds.
        ttl: f64,

        #[clap(long, default_value = "user")]
        role: Role,
    },

    /// Generate a new brief (costs the generation price).
    Generate {
        #[clap(flatten)]
        who: Who,

        #[clap(flatten)]
        form: Form,

        /// Also write the brief to a file in the working directory.
        #[clap(short, long)]
        export: Vec<ExportFormat>,
    },

    /// Draw a stored public brief matching the selection.
    Pregenerated {
        #[clap(flatten)]
        who: Who,

        #[clap(flatten)]
        form: Form,

        #[clap(short, long)]
        export: Vec<ExportFormat>,
    },

    /// Today's balance and time until reset.
    Tokens {
        #[clap(flatten)]
        who: Who,
    },

    /// A user's generated briefs, newest first.
    History {
        #[clap(short, long)]
        user: String,

        #[clap(short, long)]
        limit: Option<u32>,

        #[clap(short, long, default_value_t = 0)]
        offset: u32,
    },

    /// Write a stored brief to a file in the working directory.
    Export { id: String, format: ExportFormat },

    /// Show a user's profile, updating the given fields first.
    Profile {
        uid: String,

        #[clap(long)]
        display_name: Option<String>,

        #[clap(long)]
        payment: Option<PaymentTier>,

        #[clap(long)]
        role: Option<Role>,
    },

    /// Print the option catalog, or one category of it.
    Catalog {
        #[clap(short, long)]
        category: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic_setup();
    let cli = Cli::parse();
    set_current_dir(&cli.dir)?;
    // Report a bad conf file as an error before the global one is built.
    briefsmith::conf::read_or_create_default()?;
    briefsmith::tracing::init()?;
    tracing::debug!(?cli, "Starting.");
    match cli.cmd {
        Cmd::Server => briefsmith::server::run().await,
        Cmd::Jwt { uid, ttl, role } => {
            let conf = briefsmith::conf::global();
            let keys = briefsmith::jwt::Keys::new(&conf.jwt);
            let claims = briefsmith::auth::Claims::new(
                &uid,
                role,
                Duration::try_from_secs_f64(ttl)
                    .context(format!("Invalid token lifetime: {ttl}"))?,
                &keys,
            )?;
            let encoded: String = claims.to_str(&keys)?;
            println!("{encoded}");
            Ok(())
        }
        Cmd::Catalog { category } => {
            let json = match category {
                None => serde_json::to_string_pretty(&catalog::categories())?,
                Some(name) => {
                    let category = catalog::find(&name)
                        .ok_or_else(|| anyhow!("Unknown category: {name:?}"))?;
                    serde_json::to_string_pretty(&category)?
                }
            };
            println!("{json}");
            Ok(())
        }
        Cmd::Generate { who, form, export } => {
            let brief =
                service().await?.generate(&who.identity()?, (&form).into()).await?;
            print_brief(&brief, &export)
        }
        Cmd::Pregenerated { who, form, export } => {
            let brief = service()
                .await?
                .pregenerated(&who.identity()?, (&form).into())
                .await?;
            print_brief(&brief, &export)
        }
        Cmd::Tokens { who } => {
            let status = service().await?.token_status(&who.identity()?).await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Cmd::History {
            user,
            limit,
            offset,
        } => {
            let briefs = service()
                .await?
                .history(&Identity::User(user), limit, offset)
                .await?;
            for brief in briefs {
                println!(
                    "{}\t{}\t{}",
                    brief.id,
                    brief.created_at.to_rfc3339(),
                    export::strip_asterisks(&brief.company_name)
                );
            }
            Ok(())
        }
        Cmd::Export { id, format } => {
            let brief = service().await?.get(&id).await?;
            let path = write_export(&brief, format)?;
            println!("{}", path.display());
            Ok(())
        }
        Cmd::Profile {
            uid,
            display_name,
            payment,
            role,
        } => {
            let service = service().await?;
            let storage = service.storage();
            let current =
                storage.profile(&uid).await?.unwrap_or_else(|| Profile::new(&uid));
            if display_name.is_some() || payment.is_some() || role.is_some() {
                let updated = Profile {
                    display_name: display_name.unwrap_or(current.display_name),
                    payment: payment.unwrap_or(current.payment),
                    role: role.unwrap_or(current.role),
                    ..current
                };
                storage.profile_upsert(&updated).await?;
            }
            let user = service.profile(&Identity::User(uid)).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
    }
}

async fn service() -> anyhow::Result<BriefService> {
    BriefService::from_conf(&briefsmith::conf::global()).await
}

fn print_brief(
    brief: &briefsmith::brief::Brief,
    formats: &[ExportFormat],
) -> anyhow::Result<()> {
    print!("{}", export::to_text(brief));
    for format in formats {
        let path = write_export(brief, *format)?;
        println!("{}", path.display());
    }
    Ok(())
}

fn write_export(
    brief: &briefsmith::brief::Brief,
    format: ExportFormat,
) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(format.file_name(brief));
    let bytes = format.render(brief)?;
    fs::write(&path, bytes).context(format!("Failed to write {path:?}"))?;
    Ok(path)
}

fn set_current_dir(path: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(path)
        .context(format!("Failed to create directory path: {path:?}"))?;
    env::set_current_dir(path)
        .context(format!("Failed to set current directory to {path:?}"))?;
    Ok(())
}

fn human_panic_setup() {
    macro_rules! repo {
        () => {
            env!("CARGO_PKG_REPOSITORY")
        };
    }
    human_panic::setup_panic!(human_panic::Metadata::new(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
    .authors(env!("CARGO_PKG_AUTHORS"))
    .homepage(repo!())
    .support(concat!("- Submit an issue at ", repo!(), "/issues")));
}
