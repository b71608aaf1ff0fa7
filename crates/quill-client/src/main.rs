use std::io::{self, BufRead, Write};

use anyhow::Result;

use quill_client::ApiClient;

#[tokio::main]
async fn main() -> Result<()> {
    let base_url = std::env::var("QUILL_SERVER_URL").unwrap_or_else(|_| "http://localhost:3000".into());

    let mut args = std::env::args().skip(1);
    let (email, password) = match (args.next(), args.next()) {
        (Some(email), Some(password)) => (email, password),
        _ => {
            eprintln!("usage: quill-cli <email> <password>");
            std::process::exit(2);
        }
    };

    let client = ApiClient::new(&base_url)?;
    let user = client.login(&email, &password).await?;
    println!("logged in as {} (type a prompt, or /quit)", user.username);

    let recent = client.list_conversations().await?;
    for conv in recent.conversations.iter().take(5) {
        let preview = conv
            .last_message
            .as_ref()
            .and_then(|m| quill_types::content::preview_text(&m.content))
            .unwrap_or("");
        println!("  {}: {}", conv.title.as_deref().unwrap_or("(untitled)"), preview);
    }

    let conversation = client.create_conversation(None).await?;

    let stdin = io::stdin();
    prompt_marker()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let prompt = line.trim();
        if prompt == "/quit" {
            break;
        }
        if prompt.is_empty() {
            prompt_marker()?;
            continue;
        }

        client
            .send_stream(prompt, Some(conversation.id), |chunk| {
                print!("{chunk}");
                let _ = io::stdout().flush();
            })
            .await?;
        println!();
        prompt_marker()?;
    }

    Ok(())
}

fn prompt_marker() -> io::Result<()> {
    let mut out = io::stdout();
    out.write_all(b"> ")?;
    out.flush()
}
