//! Landing page served next to each rendered video.

use reel_models::RowIdentity;

/// Inputs of one landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingPage<'a> {
    pub identity: &'a RowIdentity,
    pub video_url: &'a str,
    pub thumbnail_url: &'a str,
    pub cta_url: &'a str,
}

impl LandingPage<'_> {
    /// Render the complete HTML document.
    ///
    /// Social preview tags point at the thumbnail and the video so shared
    /// links unfurl with a poster frame.
    pub fn render(&self) -> String {
        let name = escape_html(&display_name(self.identity));
        let video = escape_html(self.video_url);
        let thumbnail = escape_html(self.thumbnail_url);
        let cta = escape_html(self.cta_url);

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Personal Video for {name}</title>

    <meta property="og:title" content="I made this video for you">
    <meta property="og:description" content="Watch this personalized video message">
    <meta property="og:image" content="{thumbnail}">
    <meta property="og:video" content="{video}">
    <meta property="og:type" content="video.other">
    <meta name="twitter:card" content="player">
    <meta name="twitter:title" content="Personalized Video">
    <meta name="twitter:description" content="Watch this personalized video message">
    <meta name="twitter:image" content="{thumbnail}">

    <style>
{STYLE}
    </style>
</head>
<body>
    <div class="container">
        <h1>Hi {name}!</h1>
        <p class="subtitle">I recorded this personalized video for you</p>

        <video controls poster="{thumbnail}" preload="metadata">
            <source src="{video}" type="video/mp4">
            Your browser does not support the video tag.
        </video>

        <br>
        <a href="{cta}" class="cta-button" target="_blank" rel="noopener">
            Book a FREE 10 Minute Call
        </a>
    </div>
</body>
</html>
"#
        )
    }
}

const STYLE: &str = r#"        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            display: flex;
            justify-content: center;
            align-items: center;
            padding: 20px;
        }
        .container {
            background: white;
            border-radius: 20px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            max-width: 900px;
            width: 100%;
            padding: 40px;
            text-align: center;
        }
        h1 { color: #333; font-size: 2.5rem; margin-bottom: 10px; }
        .subtitle { color: #666; font-size: 1.1rem; margin-bottom: 30px; }
        video {
            width: 100%;
            max-width: 800px;
            border-radius: 12px;
            box-shadow: 0 10px 30px rgba(0,0,0,0.2);
            margin-bottom: 30px;
        }
        .cta-button {
            display: inline-block;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: white;
            padding: 18px 48px;
            border-radius: 50px;
            text-decoration: none;
            font-size: 1.2rem;
            font-weight: 600;
            margin-top: 10px;
        }
        @media (max-width: 768px) {
            .container { padding: 30px 20px; }
            h1 { font-size: 2rem; }
            .cta-button { padding: 15px 36px; font-size: 1rem; }
        }"#;

/// Title-cased greeting name (`jane_doe` -> `Jane Doe`).
pub fn display_name(identity: &RowIdentity) -> String {
    identity
        .as_str()
        .split(['_', '-', '.'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let id = RowIdentity::parse("jane_doe").unwrap();
        assert_eq!(display_name(&id), "Jane Doe");
        let id = RowIdentity::parse("acme.co").unwrap();
        assert_eq!(display_name(&id), "Acme Co");
    }

    #[test]
    fn test_render_contains_links_and_meta() {
        let id = RowIdentity::parse("apple").unwrap();
        let html = LandingPage {
            identity: &id,
            video_url: "https://cdn.example.com/apple/video.mp4",
            thumbnail_url: "https://cdn.example.com/apple/thumbnail.jpg",
            cta_url: "https://cal.example.com/book?a=1&b=2",
        }
        .render();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Personal Video for Apple</title>"));
        assert!(html.contains(
            r#"<meta property="og:video" content="https://cdn.example.com/apple/video.mp4">"#
        ));
        assert!(html.contains(r#"poster="https://cdn.example.com/apple/thumbnail.jpg""#));
        assert!(html.contains(r#"<meta name="twitter:card" content="player">"#));
        assert!(html.contains(r#"href="https://cal.example.com/book?a=1&amp;b=2""#));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">"#), "&lt;a href=&quot;x&quot;&gt;");
    }
}
