use std::env;
use std::process;
use std::time::Duration;
use tail_reader::{TailOptions, TailingFile};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <file_path> [read_timeout_ms]", args[0]);
        process::exit(1);
    }

    let file_path = &args[1];
    let read_timeout = match args.get(2).map(|ms| ms.parse::<u64>()) {
        None => None,
        Some(Ok(ms)) => Some(Duration::from_millis(ms)),
        Some(Err(e)) => {
            eprintln!("Invalid read timeout '{}': {}", args[2], e);
            process::exit(1);
        }
    };

    let options = TailOptions::default().with_read_timeout(read_timeout);
    let mut file = match TailingFile::open_with(file_path, options).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening file: {}", e);
            process::exit(1);
        }
    };

    let mut stdout = tokio::io::stdout();
    if let Err(e) = tokio::io::copy(&mut file, &mut stdout).await {
        eprintln!("Error reading file: {}", e);
        process::exit(1);
    }
}
