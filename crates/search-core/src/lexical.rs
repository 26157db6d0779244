use std::path::Path;

use anyhow::{Context, Result, bail};
use common::FragmentHit;
use tantivy::schema::Value;
use tantivy::{
    Index, IndexReader, IndexWriter, TantivyDocument,
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions},
};

// Splits a free-text question into OR'd keyword terms. Every non-alphanumeric
// character is a separator, so no query syntax survives into the parser.
pub fn keyword_terms(text: &str) -> Vec<String> {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

pub struct TantivyKeywordIndex {
    index: Index,
    reader: IndexReader,
    fields: KeywordFields,
}

#[derive(Clone, Copy)]
struct KeywordFields {
    document_id: Field,
    content: Field,
}

impl TantivyKeywordIndex {
    pub fn build_in_memory<'a>(
        fragments: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        let fields = resolve_fields(&index)?;
        let mut writer: IndexWriter = index.writer_with_num_threads(1, 20_000_000)?;
        for (document_id, text) in fragments {
            let mut doc = TantivyDocument::default();
            doc.add_text(fields.document_id, document_id);
            doc.add_text(fields.content, text);
            writer.add_document(doc)?;
        }
        writer.commit()?;
        Self::from_index(index)
    }

    pub fn open_on_disk(index_dir: &Path) -> Result<Self> {
        if !index_dir.join("meta.json").exists() {
            bail!("no keyword index at {}", index_dir.display());
        }
        let index = Index::open_in_dir(index_dir)
            .with_context(|| format!("failed opening keyword index {}", index_dir.display()))?;
        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        let fields = resolve_fields(&index)?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    pub fn search(&self, query_text: &str, limit: usize) -> Result<Vec<FragmentHit>> {
        let terms = keyword_terms(query_text);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.content]);
        let parsed = parser.parse_query(&terms.join(" "))?;
        let docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

        let mut out = Vec::with_capacity(docs.len());
        for (score, address) in docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            out.push(FragmentHit {
                document_id: stored_text(&doc, self.fields.document_id, "document_id")?,
                text: stored_text(&doc, self.fields.content, "content")?,
                score,
            });
        }
        Ok(out)
    }
}

fn stored_text(doc: &TantivyDocument, field: Field, name: &str) -> Result<String> {
    doc.get_first(field)
        .and_then(|value| value.as_value().as_str().map(ToOwned::to_owned))
        .with_context(|| format!("stored fragment has no `{name}` field"))
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let content_options = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let _ = schema_builder.add_text_field("document_id", STRING | STORED);
    let _ = schema_builder.add_text_field("content", content_options);
    schema_builder.build()
}

fn resolve_fields(index: &Index) -> Result<KeywordFields> {
    let schema = index.schema();
    Ok(KeywordFields {
        document_id: schema.get_field("document_id")?,
        content: schema.get_field("content")?,
    })
}
