use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{bail, Result};
use clap::Parser;
use tqdm::tqdm;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use magan::toy::{ToyDomains, TOY_DIM};
use magan::{DeviceConfig, FeatureCorrespondence, Magan, MaganConfig};

#[derive(Parser, Debug)]
#[command(version, about = "MAGAN via Rust, trained on a toy two-ring problem.", long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 5000)]
    iters: u64,
    #[arg(long, default_value_t = 64)]
    batch_size: i64,
    #[arg(long, default_value_t = 0.001)]
    lr: f64,
    #[arg(long, default_value_t = 2000)]
    samples: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 500)]
    log_every: u64,
    #[arg(short, long)]
    save_folder: Option<PathBuf>,
    #[arg(short, long)]
    restore: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    cpu: bool,
    #[arg(long, default_value_t = 1.0)]
    gpu_fraction: f64,
    #[arg(long, default_value_t = false)]
    report_components: bool,
}

static TRACING: OnceLock<()> = OnceLock::new();

fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        Registry::default().with(filter).with(fmt_layer).init();
    });
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    if args.batch_size <= 0 {
        bail!("--batch-size must be positive, got {}", args.batch_size)
    }
    if args.samples == 0 {
        bail!("--samples must be positive")
    }
    if args.log_every == 0 {
        bail!("--log-every must be positive")
    }

    tch::manual_seed(args.seed as i64);

    let device = DeviceConfig {
        no_gpu: args.cpu,
        gpu_fraction: args.gpu_fraction,
    };
    let mut config = MaganConfig::new(TOY_DIM, TOY_DIM)
        .with_learning_rate(args.lr)
        .with_device(device)
        .with_report_components(args.report_components);
    if let Some(folder) = &args.restore {
        config = config.with_restore_folder(folder);
    }

    // coordinate i of B1 is meant to land on coordinate i of B2
    let correspondence = FeatureCorrespondence::new(&[(0, 0), (1, 1)]);
    let mut model = Magan::new(config, correspondence)?;

    info!("Samples per domain: {}", args.samples);
    info!("Batch Size: {}", args.batch_size);
    info!("Learning Rate: {}", args.lr);
    info!("Iterations: {}", args.iters);

    let mut toy = ToyDomains::new(args.samples, args.seed);
    info!("{}", model.get_loss_names());

    for _ in tqdm(0..args.iters) {
        let (xb1, xb2) = toy.minibatch(args.batch_size, model.device());
        model.train(&xb1, &xb2)?;

        if model.iteration() % args.log_every == 0 {
            let (xb1, xb2) = toy.minibatch(args.batch_size, model.device());
            info!("{}: {}", model.iteration(), model.get_loss(&xb1, &xb2)?);
            let realness = model.realness(&xb1, &xb2)?;
            info!(
                d1_real = realness.d1_real,
                d1_fake = realness.d1_fake,
                d2_real = realness.d2_real,
                d2_fake = realness.d2_fake,
                "discriminator realness"
            );
            if let Some(folder) = &args.save_folder {
                model.save(None, folder)?;
            }
        }
    }

    if let Some(folder) = &args.save_folder {
        model.save(None, folder)?;
    }

    Ok(())
}
