use unicode_width::UnicodeWidthStr;
use std::fmt;

/// Terminal/monospace display width of `text`.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// `text` padded with spaces to `width` display columns.
pub fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(display_width(text));
    format!("{}{}", text, " ".repeat(fill))
}

/// Markdown table whose columns line up in a monospace view, including
/// names with wide characters.
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells: Vec<String> = cells.into_iter().map(Into::into).collect();
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.rows
                    .iter()
                    .map(|r| display_width(&r[i]))
                    .fold(display_width(header).max(3), usize::max)
            })
            .collect()
    }
}

impl fmt::Display for TextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let line = |cells: &[String]| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, &w)| pad(cell, w))
                .collect();
            format!("| {} |", padded.join(" | "))
        };

        writeln!(f, "{}", line(&self.headers))?;
        let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
        writeln!(f, "|-{}-|", rule.join("-|-"))?;
        for row in &self.rows {
            writeln!(f, "{}", line(row))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_width() {
        assert_eq!(display_width("User"), 4);
    }

    #[test]
    fn test_unicode_width() {
        // 全角文字は幅2
        assert_eq!(display_width("ユーザー"), 8);
    }

    #[test]
    fn test_mixed_width() {
        // "User" (4) + "テスト" (6) = 10
        assert_eq!(display_width("Userテスト"), 10);
        assert_eq!(pad("テスト", 8), "テスト  ");
    }

    #[test]
    fn test_table_alignment() {
        let mut table = TextTable::new(["column", "type"]);
        table.row(["user_id", "uuid"]);
        table.row(["名前", "text"]);

        assert_eq!(
            table.to_string(),
            "| column  | type |\n\
             |---------|------|\n\
             | user_id | uuid |\n\
             | 名前    | text |\n"
        );
    }

    #[test]
    fn test_short_rows_are_filled() {
        let mut table = TextTable::new(["a", "b"]);
        table.row(["x"]);
        assert!(!table.is_empty());
        assert!(table.to_string().ends_with("| x   |     |\n"));
    }
}
