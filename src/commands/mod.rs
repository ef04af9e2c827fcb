use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::{Context, Error};

pub mod chat;
pub mod database;
pub mod memory;
pub mod summary;

/// Sends a reply, splitting it into multiple messages when it exceeds
/// the Discord message limit.
pub async fn say_chunked(ctx: &Context<'_>, content: &str) -> Result<(), Error> {
    for chunk in split_message(content, DISCORD_MESSAGE_LIMIT - 50) {
        ctx.say(chunk).await?;
    }
    Ok(())
}

/// Splits on line boundaries where possible; a single oversized line is
/// hard-split at a char boundary.
fn split_message(content: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in content.split('\n') {
        let mut line = line;
        while line.len() > max {
            let mut cut = max;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            let (head, rest) = line.split_at(cut);
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(head.to_string());
            line = rest;
        }
        if !current.is_empty() && current.len() + line.len() + 1 > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_single_chunk() {
        let chunks = split_message("hello\nworld", 100);
        assert_eq!(chunks, vec!["hello\nworld"]);
    }

    #[test]
    fn test_split_on_line_boundaries() {
        let content = format!("{}\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = split_message(&content, 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn test_oversized_line_hard_split() {
        let content = "x".repeat(250);
        let chunks = split_message(&content, 100);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 100));
    }

    #[test]
    fn test_hard_split_respects_char_boundaries() {
        let content = "é".repeat(100); // 2 bytes per char
        let chunks = split_message(&content, 101);
        assert!(chunks.iter().all(|c| c.len() <= 101));
        assert_eq!(chunks.concat(), content);
    }
}
