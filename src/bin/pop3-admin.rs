use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(name = "pop3-admin")]
#[command(about = "Management CLI for the POP3 proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:4042")]
    address: String,

    #[arg(short, long, default_value = "protos")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List users with a registered upstream
    ListUsers,
    /// Route a user to an upstream server
    SetServer { user: String, host: String, port: u16 },
    /// Print traffic statistics
    Stats,
    /// Toggle the leet text transformation
    ToggleLeet,
    /// Toggle image rotation
    ToggleRotation,
    /// Stop the proxy
    Finalize,
}

impl Commands {
    fn line(&self) -> String {
        match self {
            Commands::ListUsers => "LISTUSERS".to_string(),
            Commands::SetServer { user, host, port } => format!("SETSERVER {} {} {}", user, host, port),
            Commands::Stats => "RETRSTATS".to_string(),
            Commands::ToggleLeet => "TOGGLELEET".to_string(),
            Commands::ToggleRotation => "TOGGLEROTATION".to_string(),
            Commands::Finalize => "FINALIZE".to_string(),
        }
    }

    /// Line that ends a successful multi-line reply, if any.
    fn terminator(&self) -> Option<&'static str> {
        match self {
            Commands::ListUsers => Some("."),
            Commands::Stats => Some("STATSEND"),
            _ => None,
        }
    }
}

/// Fail unless `reply` is positive.
fn expect_ok(reply: &str, context: &str) -> Result<(), String> {
    if reply.starts_with("+OK") {
        Ok(())
    } else {
        Err(format!("{}: {}", context, reply))
    }
}

/// Undo dot-stuffing of a listing line.
fn unstuff(line: &str) -> &str {
    match line.strip_prefix('.') {
        Some(rest) if !rest.is_empty() => rest,
        _ => line,
    }
}

type Lines = tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>;

async fn next_line(lines: &mut Lines) -> Result<String, Box<dyn std::error::Error>> {
    lines
        .next_line()
        .await?
        .ok_or_else(|| "connection closed by proxy".into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let stream = TcpStream::connect(&cli.address).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let greeting = next_line(&mut lines).await?;
    expect_ok(&greeting, "unexpected greeting")?;

    writer.write_all(format!("AUTH {}\r\n", cli.password).as_bytes()).await?;
    let auth = next_line(&mut lines).await?;
    expect_ok(&auth, "authentication rejected")?;

    writer.write_all(format!("{}\r\n", cli.command.line()).as_bytes()).await?;
    let first = next_line(&mut lines).await?;
    println!("{}", first);
    if first != "STATSSTART" {
        expect_ok(&first, "command rejected")?;
    }
    if let Some(end) = cli.command.terminator() {
        let multi = first.starts_with("+OK") || first == "STATSSTART";
        if multi && first != end {
            loop {
                let line = next_line(&mut lines).await?;
                if line == end {
                    println!("{}", line);
                    break;
                }
                println!("{}", unstuff(&line));
            }
        }
    }

    if !matches!(cli.command, Commands::Finalize) {
        writer.write_all(b"QUIT\r\n").await?;
        let _ = next_line(&mut lines).await;
    }
    Ok(())
}
