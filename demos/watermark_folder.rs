//! Watermark every image in a folder with a logo.
//!
//! Usage:
//! ```sh
//! cargo run --example watermark_folder -- photos marked logo.png
//! ```

use std::env;
use std::process;

use batch_watermark::{run, CancelToken, JobDescription, SizePercent, WatermarkSpec};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <input_dir> <output_dir> <logo>", args[0]);
        process::exit(1);
    }

    let job = JobDescription {
        input_dir: args[1].clone().into(),
        output_dir: args[2].clone().into(),
        watermark: WatermarkSpec::Image {
            path: args[3].clone().into(),
        },
        size: SizePercent::new(20.0).expect("20% is a valid size"),
        opacity: Default::default(),
        options: Default::default(),
    };

    let report = match run(&job, &CancelToken::new(), &mut |p| {
        println!("[{}/{}] {}", p.current, p.total, p.path.display());
    }) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    println!("{}", report.summary());
    for (file, reason) in report.failures() {
        eprintln!("  {file}: {reason}");
    }
}
