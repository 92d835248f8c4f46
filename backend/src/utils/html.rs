/// Clean lesson HTML using the ammonia whitelist.
///
/// Safe formatting tags (<b>, <p>, <pre>, <a href>) survive; <script>, <iframe>
/// and event-handler attributes are stripped along with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_script() {
        let cleaned = clean_html("<p>Intro</p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>Intro</p>");
    }

    #[test]
    fn test_strips_event_handlers() {
        let cleaned = clean_html(r#"<b onclick="steal()">STAR method</b>"#);
        assert_eq!(cleaned, "<b>STAR method</b>");
    }
}
