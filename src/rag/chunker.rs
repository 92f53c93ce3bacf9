//! 文档分块：先按 markdown 标题（# / ## / ###）切成小节，再对每节做带重叠的定长切分
//!
//! 定长切分在窗口内从高优先级分隔符（段落 → 换行 → 句号 → 空格）处回退断开，按字符计数，UTF-8 安全。

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            ..Self::default()
        }
    }
}

/// 定长分块器
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// 将文本分割为块，去掉首尾空白，丢弃空块
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let chunk_size = self.config.chunk_size.max(1);

        let mut current_idx = 0;
        while current_idx < total_chars {
            let target_end = (current_idx + chunk_size).min(total_chars);
            let mut actual_end = target_end;

            // 不在文末时，尝试在分隔符处断开
            if target_end < total_chars {
                let window: String = chars[current_idx..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = window.rfind(sep.as_str()) {
                        let chars_to_sep = window[..pos].chars().count() + sep.chars().count();
                        if chars_to_sep > self.config.chunk_overlap {
                            actual_end = current_idx + chars_to_sep;
                            break;
                        }
                    }
                }
            }

            let piece: String = chars[current_idx..actual_end].iter().collect();
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if actual_end >= total_chars {
                break;
            }

            let overlap = self.config.chunk_overlap.min(actual_end - current_idx);
            let next_start = actual_end - overlap;
            current_idx = if next_start > current_idx {
                next_start
            } else {
                actual_end
            };
        }

        chunks
    }
}

/// 按标题切出的小节；headers 为 (级别, 标题文本)，级别 1..=3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub headers: Vec<(usize, String)>,
    pub content: String,
}

fn parse_header(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim();
    (!title.is_empty()).then(|| (level, title.to_string()))
}

/// 按 # / ## / ### 标题切分；标题行本身不进入 content，出现较高级标题时清空更深级别
pub fn split_by_headers(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut headers: Vec<(usize, String)> = Vec::new();
    let mut buf: Vec<&str> = Vec::new();

    let mut flush = |headers: &Vec<(usize, String)>, buf: &mut Vec<&str>| {
        let content = buf.join("\n").trim().to_string();
        if !content.is_empty() {
            sections.push(Section {
                headers: headers.clone(),
                content,
            });
        }
        buf.clear();
    };

    for line in text.lines() {
        match parse_header(line) {
            Some((level, title)) => {
                flush(&headers, &mut buf);
                headers.retain(|(l, _)| *l < level);
                headers.push((level, title));
            }
            None => buf.push(line),
        }
    }
    flush(&headers, &mut buf);

    sections
}
