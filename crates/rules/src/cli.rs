use std::path::PathBuf;

pub struct Args {
    pub config_path: PathBuf,
}

pub fn parse() -> Args {
    match parse_from(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => std::process::exit(0),
        Err(msg) => {
            eprintln!("error: {msg}");
            std::process::exit(1);
        }
    }
}

/// `Ok(None)` means the request was answered on stdout (help, version).
fn parse_from(mut args: impl Iterator<Item = String>) -> Result<Option<Args>, String> {
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("sentinel_rules {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "--help" | "-h" => {
                println!("Usage: sentinel_rules [OPTIONS]\n");
                println!("Options:");
                println!("  -c, --config <PATH>  Configuration file path");
                println!("  -V, --version        Print version");
                println!("  -h, --help           Print help");
                return Ok(None);
            }
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config requires a path argument".to_string())?;
                return Ok(Some(Args {
                    config_path: PathBuf::from(path),
                }));
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }
    Err("--config <path> is required".to_string())
}
