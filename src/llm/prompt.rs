use minijinja::{context, Environment};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt;

use crate::db::introspector::SchemaDescriptor;

const PLANNING_TEMPLATE: &str = r#"
You are a Business Intelligence data agent working against a DuckDB database. Your job is to:
- Convert the user's question into a single valid DuckDB SQL query using the schema below.
- Return a JSON object with the SQL, a visualization config, a list of insights and follow-up questions.
- Cope with inconsistent data, cryptic column names and abbreviations.
- Explain your reasoning in the insights.
- Suggest additional questions for further analysis that this schema can answer.
- Keep the query valid, read-only and reasonably efficient, joining tables only where the schema supports it.
- If the question is NOT about this database (general knowledge, greetings, chit-chat), do NOT write SQL. Set "isChat": true and answer in the "nlp_text" field instead. For every database question set "isChat": false.
- Some tables and columns have unclear or abbreviated names (for example 'loc', 'p', 'x1', 'cat'). Map each one to its most likely business meaning ('loc' -> location, 'p' -> price, 'cat' -> category), use clear human-friendly aliases in the SQL and the visualization, and state every mapping you made in the insights.

Database Schema:
{{ schema | json }}

Response Format:
{
  "sql": "...SQL query...",
  "visualization": { "type": "bar|line|pie|table", "x": "column", "y": "column" },
  "insights": ["...insight 1...", "...insight 2..."],
  "additional_questions": ["...question 1...", "...question 2..."],
  "isChat": false
}

If the question is not related to the database, respond with:
{
  "isChat": true,
  "nlp_text": "...your natural language response...",
  "additional_questions": ["...question 1...", "...question 2..."]
}

Visualization types allowed: the visualization.type field must be exactly one of ["bar", "line", "pie", "table"].

Example:
User: What were the top 3 products by sales amount last month?
Response:
{
  "sql": "SELECT p.name, SUM(s.amt) AS total_sales FROM sales_data s JOIN products p ON s.pid = p.pid WHERE s.dt >= '2024-04-01' AND s.dt < '2024-05-01' GROUP BY p.name ORDER BY total_sales DESC LIMIT 3;",
  "visualization": { "type": "bar", "x": "name", "y": "total_sales" },
  "insights": ["'amt' was read as the sale amount and 'pid' as the product id.", "Product 12 was the top-selling product last month."],
  "additional_questions": ["What were the sales trends over the last 6 months?", "Which product categories performed best?"],
  "isChat": false
}

User Question:
{{ question }}

Respond with exactly one JSON object in the format above and nothing else: no prose, no markdown, no code fences.
"#;

const SUMMARY_TEMPLATE: &str = r#"
You are a business intelligence assistant. Given the user's question, the SQL query that was run and its result data, write a concise, user-friendly summary for the user.
- Point out the key statistics and any important trends or anomalies in the data.
- Offer advice or recommendations where the data supports them.
- Suggest ideas for further analysis or questions the user might explore next.
- Do not include any SQL, code, technical jargon, markdown or code fences.

User Question: {{ question }}
SQL Query: {{ sql }}
{% if truncated %}SQL Result Data (first {{ rows | length }} of {{ total_rows }} rows):{% else %}SQL Result Data:{% endif %}
{{ rows | json }}

Respond ONLY with a single plain-language paragraph.
"#;

#[derive(Debug)]
pub struct PromptError(String);

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prompt rendering failed: {}", self.0)
    }
}

impl Error for PromptError {}

impl From<minijinja::Error> for PromptError {
    fn from(e: minijinja::Error) -> Self {
        PromptError(e.to_string())
    }
}

pub enum PromptRequest<'a> {
    /// Ask the model for a query plan.
    Planning {
        question: &'a str,
        schema: &'a SchemaDescriptor,
    },
    /// Ask the model to narrate an executed query's rows.
    Summary {
        question: &'a str,
        sql: &'a str,
        rows: &'a [Map<String, Value>],
    },
}

pub struct PromptBuilder {
    env: Environment<'static>,
    summary_row_limit: usize,
}

impl PromptBuilder {
    pub fn new(summary_row_limit: usize) -> Self {
        let mut env = Environment::new();

        env.add_filter("json", |value: minijinja::value::Value| {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "null".to_string())
        });

        // Both templates are compile-time constants
        env.add_template("planning", PLANNING_TEMPLATE)
            .expect("planning template is valid");
        env.add_template("summary", SUMMARY_TEMPLATE)
            .expect("summary template is valid");

        Self {
            env,
            summary_row_limit,
        }
    }

    pub fn build(&self, request: PromptRequest<'_>) -> Result<String, PromptError> {
        let rendered = match request {
            PromptRequest::Planning { question, schema } => self
                .env
                .get_template("planning")?
                .render(context! { question, schema })?,
            PromptRequest::Summary { question, sql, rows } => {
                let shown = &rows[..rows.len().min(self.summary_row_limit)];
                self.env.get_template("summary")?.render(context! {
                    question,
                    sql,
                    rows => shown,
                    total_rows => rows.len(),
                    truncated => shown.len() < rows.len(),
                })?
            }
        };
        Ok(rendered.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::introspector::ColumnDescriptor;
    use serde_json::json;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(vec![
            (
                "sales_data".to_string(),
                vec![
                    ColumnDescriptor { name: "dt".into(), declared_type: "VARCHAR".into() },
                    ColumnDescriptor { name: "amt".into(), declared_type: "DOUBLE".into() },
                ],
            ),
            (
                "products".to_string(),
                vec![ColumnDescriptor { name: "p".into(), declared_type: "DOUBLE".into() }],
            ),
        ])
    }

    #[test]
    fn planning_prompt_embeds_schema_and_question() {
        let builder = PromptBuilder::new(10);
        let schema = schema();
        let prompt = builder
            .build(PromptRequest::Planning {
                question: "What were total sales last month?",
                schema: &schema,
            })
            .unwrap();

        assert!(prompt.contains("What were total sales last month?"));
        assert!(prompt.contains("\"sales_data\": ["));
        assert!(prompt.contains("\"name\": \"amt\""));
        assert!(prompt.contains("\"isChat\": true"));
        assert!(prompt.contains(r#"["bar", "line", "pie", "table"]"#));
        // Table order follows the descriptor, not alphabetical order
        assert!(prompt.find("sales_data").unwrap() < prompt.find("\"products\"").unwrap());
    }

    #[test]
    fn planning_prompt_is_deterministic() {
        let builder = PromptBuilder::new(10);
        let schema = schema();
        let build = || {
            builder
                .build(PromptRequest::Planning { question: "q", schema: &schema })
                .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn summary_prompt_keeps_sql_literals_intact() {
        let builder = PromptBuilder::new(10);
        let rows = vec![json!({ "total": 15234.5 }).as_object().unwrap().clone()];
        let sql = "SELECT SUM(amt) AS total FROM sales_data WHERE dt >= '2024-04-01'";
        let prompt = builder
            .build(PromptRequest::Summary { question: "Total sales?", sql, rows: &rows })
            .unwrap();

        assert!(prompt.contains(sql));
        assert!(prompt.contains("\"total\": 15234.5"));
        assert!(prompt.contains("SQL Result Data:"));
    }

    #[test]
    fn summary_prompt_caps_rows() {
        let builder = PromptBuilder::new(2);
        let rows: Vec<_> = (0..5)
            .map(|i| json!({ "n": i }).as_object().unwrap().clone())
            .collect();
        let prompt = builder
            .build(PromptRequest::Summary { question: "q", sql: "SELECT n", rows: &rows })
            .unwrap();

        assert!(prompt.contains("first 2 of 5 rows"));
        assert!(prompt.contains("\"n\": 1"));
        assert!(!prompt.contains("\"n\": 2"));
    }
}
