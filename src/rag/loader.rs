//! 文档加载与规整：按扩展名读取 .txt / .md / .html / .htm，统一输出 markdown 风格文本
//!
//! 纯文本会经过 convert_to_markdown：合并断字换行、去行尾空白、压缩多余空行，
//! 全大写行提升为 `#`，`Title:` 行提升为 `##`，编号行提升为 `###`，列对齐的行转成简单表格。

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::rag::IngestError;

/// 一份待分块的文档（txt 的每个段落块、整份 md / html 各为一份）
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// 支持的文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Txt,
    Markdown,
    Html,
}

impl FileType {
    /// 按扩展名识别（不区分大小写）
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Markdown => "md",
            Self::Html => "html",
        }
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

static HYPHEN_BREAK: OnceLock<Regex> = OnceLock::new();
static TRAILING_WS: OnceLock<Regex> = OnceLock::new();
static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
static ALL_CAPS: OnceLock<Regex> = OnceLock::new();
static TITLE_COLON: OnceLock<Regex> = OnceLock::new();
static NUMBERED: OnceLock<Regex> = OnceLock::new();
static COLUMNS: OnceLock<Regex> = OnceLock::new();
static SECTION_BREAK: OnceLock<Regex> = OnceLock::new();

fn is_table_row(line: &str) -> bool {
    regex(&COLUMNS, r"^[\w ]+ {2,}[\w ]+ {2,}[\w ]+").is_match(line)
}

/// 纯文本 → markdown 风格文本
pub fn convert_to_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let text = regex(&HYPHEN_BREAK, r"-[ \t]*\n[ \t]*").replace_all(text, "");
    let text = regex(&TRAILING_WS, r"[ \t]+\n").replace_all(&text, "\n");
    let text = regex(&BLANK_RUNS, r"\n{3,}").replace_all(&text, "\n\n");
    let text = regex(&ALL_CAPS, r"(?m)^([A-Z][A-Z \t]+)$").replace_all(&text, "# $1");
    let text = regex(&TITLE_COLON, r"(?m)^([A-Z][a-z \t]+:)$").replace_all(&text, "## $1");
    let text = regex(&NUMBERED, r"(?m)^(\d+\.\s)").replace_all(&text, "### $1");

    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if !is_table_row(line) {
            out.push(line.to_string());
            continue;
        }
        let cells: Vec<&str> = line.split_whitespace().collect();
        out.push(format!("| {} |", cells.join(" | ")));
        // 表格首行后追加分隔行
        if i == 0 || !is_table_row(lines[i - 1]) {
            out.push(format!("|{}", "---|".repeat(cells.len())));
        }
    }
    out.join("\n")
}

fn base_metadata(source: &str, file_type: FileType) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("source".into(), json!(source));
    m.insert("file_type".into(), json!(file_type.as_str()));
    m.insert("content_format".into(), json!("markdown"));
    m
}

/// 从文件名与原始字节加载文档；不支持的扩展名返回 UnsupportedFileType
pub fn load_bytes(source: &str, bytes: &[u8]) -> Result<Vec<Document>, IngestError> {
    let file_type = FileType::from_name(source)
        .ok_or_else(|| IngestError::UnsupportedFileType(source.to_string()))?;

    let docs = match file_type {
        FileType::Txt => {
            let content = String::from_utf8_lossy(bytes);
            let sections: Vec<&str> = regex(&SECTION_BREAK, r"\n\s*\n")
                .split(content.trim())
                .filter(|s| !s.trim().is_empty())
                .collect();
            let total = sections.len();
            sections
                .into_iter()
                .enumerate()
                .map(|(i, section)| {
                    let mut metadata = base_metadata(source, file_type);
                    metadata.insert("page_number".into(), json!(i + 1));
                    metadata.insert("total_sections".into(), json!(total));
                    Document {
                        content: convert_to_markdown(section.trim()),
                        metadata,
                    }
                })
                .collect()
        }
        FileType::Markdown => {
            let mut metadata = base_metadata(source, file_type);
            metadata.insert("page_number".into(), json!(1));
            metadata.insert("total_pages".into(), json!(1));
            vec![Document {
                content: String::from_utf8_lossy(bytes).into_owned(),
                metadata,
            }]
        }
        FileType::Html => {
            let text = html2text::from_read(bytes, 120)
                .map_err(|e| IngestError::Io(std::io::Error::other(e.to_string())))?;
            let mut metadata = base_metadata(source, file_type);
            metadata.insert("page_number".into(), json!(1));
            metadata.insert("total_pages".into(), json!(1));
            vec![Document {
                content: text,
                metadata,
            }]
        }
    };

    Ok(docs
        .into_iter()
        .filter(|d| !d.content.trim().is_empty())
        .collect())
}

/// 从磁盘读取并加载；source 元数据为路径字符串
pub async fn load_file(path: &Path) -> Result<Vec<Document>, IngestError> {
    let source = path.to_string_lossy().to_string();
    // 先校验扩展名，避免读取不支持的大文件
    FileType::from_name(&source).ok_or_else(|| IngestError::UnsupportedFileType(source.clone()))?;
    let bytes = tokio::fs::read(path).await?;
    load_bytes(&source, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_name("report.TXT"), Some(FileType::Txt));
        assert_eq!(FileType::from_name("a/b/notes.md"), Some(FileType::Markdown));
        assert_eq!(FileType::from_name("q3.htm"), Some(FileType::Html));
        assert_eq!(FileType::from_name("q3.pdf"), None);
        assert_eq!(FileType::from_name("README"), None);
    }

    #[test]
    fn test_convert_to_markdown_headers() {
        let text = "ANNUAL REPORT\nSummary:\n1. Revenue rose\nplain line";
        let md = convert_to_markdown(text);
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines[0], "# ANNUAL REPORT");
        assert_eq!(lines[1], "## Summary:");
        assert_eq!(lines[2], "### 1. Revenue rose");
        assert_eq!(lines[3], "plain line");
    }

    #[test]
    fn test_convert_to_markdown_cleanup() {
        let md = convert_to_markdown("share-\nholders   \n\n\n\nnext");
        assert_eq!(md, "shareholders\n\nnext");
    }

    #[test]
    fn test_convert_to_markdown_table() {
        let text = "Metric  Q1  Q2\nRevenue  10  12";
        let md = convert_to_markdown(text);
        assert_eq!(
            md,
            "| Metric | Q1 | Q2 |\n|---|---|---|\n| Revenue | 10 | 12 |"
        );
    }

    #[test]
    fn test_txt_split_into_sections() {
        let docs = load_bytes("earnings.txt", b"First part.\n\n  \nSecond part.\n").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "First part.");
        assert_eq!(docs[1].metadata["page_number"], 2);
        assert_eq!(docs[1].metadata["total_sections"], 2);
        assert_eq!(docs[0].metadata["file_type"], "txt");
        assert_eq!(docs[0].metadata["source"], "earnings.txt");
    }

    #[test]
    fn test_html_to_text() {
        let html = b"<html><body><h1>Q3 Results</h1><p>Revenue grew 8%.</p></body></html>";
        let docs = load_bytes("q3.html", html).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.contains("Q3 Results"));
        assert!(docs[0].content.contains("Revenue grew 8%."));
        assert!(!docs[0].content.contains("<p>"));
    }

    #[test]
    fn test_unsupported_type() {
        let err = load_bytes("deck.pptx", b"..").unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFileType(name) if name == "deck.pptx"));
    }
}
