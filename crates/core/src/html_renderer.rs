use std::borrow::Cow;
use std::io::{self, Write};

use crate::event::{Alignment, CodeBlockKind, Event, Tag, TagEnd};
use crate::highlight;

pub struct HtmlRenderer<W: Write> {
    writer: W,
    inline: bool,
    table_head_depth: usize,
    table_stack: Vec<TableState>,
    image: Option<ImageContext>,
    code_block: Option<CodeBlockContext>,
}

struct TableState {
    alignments: Vec<Alignment>,
    column_index: usize,
}

struct ImageContext {
    dest_url: String,
    title: String,
    original: Option<String>,
    alt: String,
    /// Nesting level of further image containers inside the alt content.
    depth: usize,
}

struct CodeBlockContext {
    token: String,
    buffer: String,
}

impl<W: Write> HtmlRenderer<W> {
    /// `inline` suppresses paragraph wrappers so single-line messages render
    /// as bare inline markup.
    pub fn new(writer: W, inline: bool) -> Self {
        Self {
            writer,
            inline,
            table_head_depth: 0,
            table_stack: Vec::new(),
            image: None,
            code_block: None,
        }
    }

    pub fn render<'a, I>(mut self, iter: I) -> io::Result<W>
    where
        I: IntoIterator<Item = Event<'a>>,
    {
        for event in iter.into_iter() {
            if self.handle_image_text(&event) {
                continue;
            }
            if self.handle_code_block_text(&event) {
                continue;
            }

            match event {
                Event::Start(Tag::Image {
                    dest_url,
                    title,
                    original,
                }) => {
                    self.start_image(dest_url, title, original);
                }
                Event::Start(tag) => self.write_start_tag(tag)?,
                Event::End(TagEnd::Image) => self.finish_image()?,
                Event::End(end) => self.write_end_tag(end)?,
                Event::Text(text) => {
                    self.write_text(text.as_ref())?;
                }
                Event::Code(text) => {
                    self.writer.write_all(b"<code>")?;
                    self.escape_html(text.as_ref())?;
                    self.writer.write_all(b"</code>")?;
                }
                Event::Rule => {
                    self.writer.write_all(b"<hr />\n")?;
                }
                // Chat messages treat every source line break as a break.
                Event::HardBreak | Event::SoftBreak => {
                    self.writer.write_all(b"<br />\n")?;
                }
            }
        }

        Ok(self.writer)
    }

    fn write_start_tag(&mut self, tag: Tag<'_>) -> io::Result<()> {
        match tag {
            Tag::Paragraph => {
                if self.inline {
                    Ok(())
                } else {
                    self.writer.write_all(b"<p>")
                }
            }
            Tag::Heading { level } => {
                write!(self.writer, "<h{}>", level as u8)
            }
            Tag::BlockQuote => self.writer.write_all(b"<blockquote>"),
            Tag::CodeBlock(kind) => self.start_code_block(kind),
            Tag::List(start) => {
                if let Some(idx) = start {
                    write!(self.writer, "<ol start=\"{}\">", idx)
                } else {
                    self.writer.write_all(b"<ul>")
                }
            }
            Tag::Item => self.writer.write_all(b"<li>"),
            Tag::Table(alignments) => {
                self.table_stack.push(TableState {
                    alignments,
                    column_index: 0,
                });
                self.writer.write_all(b"<table>")
            }
            Tag::TableHead => {
                self.table_head_depth += 1;
                self.writer.write_all(b"<thead>")
            }
            Tag::TableRow => {
                if let Some(state) = self.table_stack.last_mut() {
                    state.column_index = 0;
                }
                self.writer.write_all(b"<tr>")
            }
            Tag::TableCell => {
                let tag = if self.table_head_depth > 0 {
                    b"th"
                } else {
                    b"td"
                };
                self.writer.write_all(b"<")?;
                self.writer.write_all(tag)?;
                if let Some(state) = self.table_stack.last_mut() {
                    if let Some(alignment) = state.alignments.get(state.column_index) {
                        if !matches!(alignment, Alignment::None) {
                            self.writer.write_all(b" style=\"text-align:")?;
                            self.writer.write_all(match alignment {
                                Alignment::Left => b"left",
                                Alignment::Right => b"right",
                                Alignment::Center => b"center",
                                Alignment::None => b"left",
                            })?;
                            self.writer.write_all(b"\"")?;
                        }
                        state.column_index += 1;
                    }
                }
                self.writer.write_all(b">")
            }
            Tag::Emphasis => self.writer.write_all(b"<em>"),
            Tag::Strong => self.writer.write_all(b"<strong>"),
            Tag::Strikethrough => self.writer.write_all(b"<del>"),
            Tag::Link {
                dest_url, title, ..
            } => {
                self.writer.write_all(b"<a href=\"")?;
                self.escape_attr(dest_url.as_ref())?;
                self.writer.write_all(b"\"")?;
                if !title.is_empty() {
                    self.writer.write_all(b" title=\"")?;
                    self.escape_attr(title.as_ref())?;
                    self.writer.write_all(b"\"")?;
                }
                self.writer.write_all(b">")
            }
            Tag::Image { .. } => unreachable!("image handled separately"),
        }
    }

    fn write_end_tag(&mut self, end: TagEnd) -> io::Result<()> {
        match end {
            TagEnd::Paragraph => {
                if self.inline {
                    Ok(())
                } else {
                    self.writer.write_all(b"</p>\n")
                }
            }
            TagEnd::Heading(level) => {
                write!(self.writer, "</h{}>\n", level as u8)
            }
            TagEnd::BlockQuote => self.writer.write_all(b"</blockquote>\n"),
            TagEnd::CodeBlock => self.finish_code_block(),
            TagEnd::List(ordered) => {
                if ordered {
                    self.writer.write_all(b"</ol>\n")
                } else {
                    self.writer.write_all(b"</ul>\n")
                }
            }
            TagEnd::Item => self.writer.write_all(b"</li>"),
            TagEnd::Table => {
                self.table_stack.pop();
                self.writer.write_all(b"</table>\n")
            }
            TagEnd::TableHead => {
                self.table_head_depth = self.table_head_depth.saturating_sub(1);
                self.writer.write_all(b"</thead>\n")
            }
            TagEnd::TableRow => self.writer.write_all(b"</tr>\n"),
            TagEnd::TableCell => {
                let tag = if self.table_head_depth > 0 {
                    b"th"
                } else {
                    b"td"
                };
                self.writer.write_all(b"</")?;
                self.writer.write_all(tag)?;
                self.writer.write_all(b">")
            }
            TagEnd::Emphasis => self.writer.write_all(b"</em>"),
            TagEnd::Strong => self.writer.write_all(b"</strong>"),
            TagEnd::Strikethrough => self.writer.write_all(b"</del>"),
            TagEnd::Link => self.writer.write_all(b"</a>"),
            TagEnd::Image => unreachable!("image handled separately"),
        }
    }

    fn start_code_block(&mut self, kind: CodeBlockKind<'_>) -> io::Result<()> {
        let token = match &kind {
            CodeBlockKind::Fenced(info) => info.split_whitespace().next().unwrap_or(""),
            CodeBlockKind::Indented => "",
        };
        if token.is_empty() {
            self.writer.write_all(b"<pre><code>")
        } else {
            self.writer.write_all(b"<pre><code class=\"language-")?;
            self.escape_attr(token)?;
            self.writer.write_all(b"\">")?;
            self.code_block = Some(CodeBlockContext {
                token: token.to_owned(),
                buffer: String::new(),
            });
            Ok(())
        }
    }

    fn finish_code_block(&mut self) -> io::Result<()> {
        if let Some(code) = self.code_block.take() {
            match highlight::classed_html(&code.buffer, &code.token) {
                Some(highlighted) => self.writer.write_all(highlighted.as_bytes())?,
                None => self.escape_html(&code.buffer)?,
            }
        }
        self.writer.write_all(b"</code></pre>\n")
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.escape_html(text)
    }

    fn escape_html(&mut self, text: &str) -> io::Result<()> {
        for ch in text.chars() {
            match ch {
                '&' => self.writer.write_all(b"&amp;")?,
                '<' => self.writer.write_all(b"&lt;")?,
                '>' => self.writer.write_all(b"&gt;")?,
                '"' => self.writer.write_all(b"&quot;")?,
                '\'' => self.writer.write_all(b"&#39;")?,
                _ => self
                    .writer
                    .write_all(ch.encode_utf8(&mut [0; 4]).as_bytes())?,
            }
        }
        Ok(())
    }

    fn escape_attr(&mut self, value: &str) -> io::Result<()> {
        self.escape_html(value)
    }

    fn start_image(
        &mut self,
        dest_url: Cow<'_, str>,
        title: Cow<'_, str>,
        original: Option<Cow<'_, str>>,
    ) {
        self.image = Some(ImageContext {
            dest_url: dest_url.into_owned(),
            title: title.into_owned(),
            original: original.map(Cow::into_owned),
            alt: String::new(),
            depth: 0,
        });
    }

    fn finish_image(&mut self) -> io::Result<()> {
        if let Some(image) = self.image.take() {
            self.writer.write_all(b"<img src=\"")?;
            self.escape_attr(&image.dest_url)?;
            self.writer.write_all(b"\" alt=\"")?;
            self.escape_attr(&image.alt)?;
            self.writer.write_all(b"\"")?;
            if !image.title.is_empty() {
                self.writer.write_all(b" title=\"")?;
                self.escape_attr(&image.title)?;
                self.writer.write_all(b"\"")?;
            }
            if let Some(original) = &image.original {
                self.writer.write_all(b" data-original=\"")?;
                self.escape_attr(original)?;
                self.writer.write_all(b"\"")?;
            }
            self.writer.write_all(b" loading=\"lazy\" />")
        } else {
            Ok(())
        }
    }

    /// While an image is open, everything up to its matching end event is
    /// flattened into the alt text instead of being written out.
    fn handle_image_text(&mut self, event: &Event<'_>) -> bool {
        let Some(current) = self.image.as_mut() else {
            return false;
        };
        match event {
            Event::Start(Tag::Image { .. }) => {
                current.depth += 1;
                true
            }
            Event::End(TagEnd::Image) if current.depth > 0 => {
                current.depth -= 1;
                true
            }
            Event::End(TagEnd::Image) => false,
            Event::Text(text) | Event::Code(text) => {
                current.alt.push_str(text.as_ref());
                true
            }
            Event::SoftBreak | Event::HardBreak => {
                current.alt.push(' ');
                true
            }
            _ => true,
        }
    }

    fn handle_code_block_text(&mut self, event: &Event<'_>) -> bool {
        if let Some(current) = self.code_block.as_mut() {
            if let Event::Text(text) = event {
                current.buffer.push_str(text.as_ref());
                return true;
            }
        }
        false
    }
}
