//! Prompts - Fixed prompt text for SQL generation and column renaming
//!
//! The domain rules below are business policy for the telecom warehouse and
//! are reproduced word for word; do not paraphrase them.

/// System message for SQL generation
pub const SQL_SYSTEM_PROMPT: &str =
    "You are a SQL expert. Generate SQL queries based on user requirements.";

/// System message for column renaming
pub const RENAME_SYSTEM_PROMPT: &str =
    "You are a SQL expert. Respond only with the requested Python dictionary.";

/// Key SQL generation rules
pub const SQL_GENERATION_RULES: &str = r#"### **2. Key SQL Generation Rules:**
- Use **only the provided metadata** for column names. Do not hallucinate any columns.
- Remember you are writing sql queries for BIGQUERY.
- Prioritize business-critical columns for clarity.
- Convert **technical column names** into business-friendly terms where necessary.
- Ensure queries generate **clear, actionable tables**.
- If `siteid` is present, it **must be the first column**.
- Round numeric values to **2 decimal places** where applicable."#;

/// Table selection, units and date conventions
pub const TABLE_SPECIFIC_RULES: &str = r#"### **3. Table-Specific Rules:**
- If the query involves **fuel consumption**, use `edgepointprod.Axin_Data.dailyfueldata`.
- If consumption is `0.0`, it means no fuel was consumed.
- Access dates as: `DATE(time) = 'YYYY-MM-DD'` the year will not be earlier than 2024.

- Use 'edgepointprod.Axin_Data.siteinfra' for details regarding infrastructure of the sites like counts, models, availability status, province, area.

- Use `edgepointprod.Axin_Data.site` only for matching companyId with siteId. No other columns are necessary.

- If the query involves **run hours**, use `edgepointprod.Axin_Data.performancedaily`.
- Run hours range from **0 to 24 per day**.
- Never use hourly tables, as they contain fractional values **(0-1 per hour).**"#;

/// Output shape for ranking queries
pub const MAX_MIN_FORMATTING_RULES: &str = r#"### **4. Formatting Rules for MAX/MIN Queries:**
- Always include **the date column** in the result.
- If ranking by **highest/lowest values**, sort accordingly and **exclude NULL values**.

- Example format:
    ```
    SELECT
        s.siteid,
        s.sitename,
        metric_value,
        DATE(timestamp_column) AS metric_date
    FROM [table]
    WHERE [conditions]
    ORDER BY metric_value DESC/ASC
    ```"#;

pub const CRITICAL_RULES: &str = r#"CRITICAL: The SQL query should ALWAYS:
    - Dynamically use the companyId from the 'edgepointprod.Axin_Data.site' table
    - Join the relevant tables and retrieve data
    - Format dates appropriately using DATE() function

Output a SQL query that addresses the user's intent with clarity and precision."#;

pub const NO_CONTEXT: &str = "No previous context";

/// Assemble the SQL generation prompt
pub fn build_sql_prompt(user_query: &str, metadata_text: &str, context_text: &str) -> String {
    format!(
        r#"## SQL Query Generation Guidelines:

### **1. Query Context:**
- **User Request:** {}
- **Metadata (Table & Column Descriptions):** {}
- **Conversation Context:** {}

{}

{}

{}

{}
"#,
        user_query,
        metadata_text,
        context_text,
        SQL_GENERATION_RULES,
        TABLE_SPECIFIC_RULES,
        MAX_MIN_FORMATTING_RULES,
        CRITICAL_RULES
    )
}

/// Assemble the column rename prompt for the given warehouse column names
pub fn build_rename_prompt(columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| format!("'{}'", c.replace('\'', "\\'"))).collect();
    format!(
        r#"Here are the original database columns: [{}]

Rename them professionally with the following rules:
- Proper capitalization
- Use units where applicable (e.g., minutes, kW, etc.)
- Convert underscores to spaces

Example Mappings:
- 'total_disconnection_duration' → 'Total Disconnection Duration (minutes)'
- 'avg_power_kw' → 'Average Power (kW)'
- 'battery_backup_hrs' → 'Battery Backup (Hours)'

Return only a **valid Python dictionary**
"#,
        quoted.join(", ")
    )
}
