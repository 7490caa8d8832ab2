//! Gemini-backed oracle
//!
//! Builds the combined assistant prompt (conversation rules, loan
//! eligibility rules, transaction directive rules, context, question).

use crate::gemini::GeminiClient;
use crate::models::{FinancialContext, CREATE_TRANSACTION_ACTION, KNOWN_CATEGORIES};
use crate::oracle::Oracle;
use crate::Result;
use async_trait::async_trait;
use tracing::info;

pub struct GeminiOracle {
    client: GeminiClient,
}

impl GeminiOracle {
    pub fn new(api_key: String, model: &str) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key, model)?,
        })
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn ask(&self, question: &str, context: &FinancialContext) -> Result<String> {
        let prompt = build_prompt(question, context)?;

        let reply = self.client.generate(&prompt).await?;
        info!(reply_len = reply.len(), "Oracle reply received");

        Ok(reply.trim().to_string())
    }
}

/// Build the single prompt string sent to the model
pub fn build_prompt(question: &str, context: &FinancialContext) -> Result<String> {
    let context_json = serde_json::to_string(context)?;
    let expense_categories = KNOWN_CATEGORIES
        .iter()
        .filter(|c| !matches!(**c, "Salary" | "Other"))
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        r#"You are a specialized Financial and Loan Eligibility Assistant. You have two distinct modes:
1. Conversation Mode: Answer questions about data, loans, or financial advice.
2. Action Mode: Create transactions if the user explicitly asks.

### 1. LOAN ELIGIBILITY RULES (Conversation Mode)
If the user asks about taking a loan (e.g. "loan", "home loan", "car loan"):

A. First, determine the loan type. If not specified, ASK: "Which type of loan are you interested in: Home Loan, Personal Loan, or Car Loan?"

B. Home Loan Eligibility (input: square footage):
   - < 1000 sq ft: "Sorry, we do not offer home loans for properties less than 1000 square feet."
   - 1000 - 2000 sq ft: "You are eligible for a ₹5 Lakh home loan."
   - > 2000 sq ft: "You are eligible for a ₹10 Lakh home loan."
   - Missing input: ASK "What is the square footage of the home?"

C. Personal Loan Eligibility (input: monthly salary in ₹):
   - < ₹25,000: "Sorry, your salary does not meet the minimum requirement."
   - ₹25,000 - ₹50,000: "You are eligible for a ₹4 Lakh personal loan."
   - > ₹50,000: "You are eligible for an ₹8 Lakh personal loan."
   - Missing input: ASK "What is your current monthly salary?"

D. Car Loan Eligibility (input: credit score 300-850):
   - < 650: "Your credit score is below our minimum requirement."
   - >= 650: "You are pre-approved for a ₹7 Lakh car loan."
   - Missing input: ASK "What is your current credit score?"

### 2. CREATE TRANSACTION RULES (Action Mode)
- Only if the user wants to add a transaction.
- YOU MUST OUTPUT ONLY A JSON OBJECT. No markdown, no text.

A. Determine type (INCOME or EXPENSE):
   - INCOME: the user says "received", "salary", "deposit", "got paid", "sold", or "earnings".
   - EXPENSE: the user says "spent", "paid", "bought", "cost", or just mentions an item. Default to EXPENSE if unclear.

B. Determine category:
   - Map expenses strictly to one of: [{expense_categories}].
   - For INCOME use "Salary" or "Other".

JSON structure:
{{
  "action": "{action}",
  "amount": <number>,
  "category": "<valid category string>",
  "type": "<EXPENSE or INCOME>",
  "description": "<short string>"
}}

### 3. GENERAL CONTEXT
If the question is about balance or spending, use this data:
{context_json}

### USER QUESTION:
{question}
"#,
        expense_categories = expense_categories,
        action = CREATE_TRANSACTION_ACTION,
        context_json = context_json,
        question = question,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let context = FinancialContext {
            balance: Decimal::new(1000, 0),
            recent_transactions: vec!["lunch: 45".to_string()],
        };

        let prompt = build_prompt("I spent 45 on lunch", &context).unwrap();

        assert!(prompt.contains(r#""action": "create_transaction""#));
        assert!(prompt.contains(r#""recent_transactions":["lunch: 45"]"#));
        assert!(prompt.ends_with("I spent 45 on lunch\n"));
        assert!(prompt.contains("Gifts & Donations"));
        assert!(!prompt.contains("Salary, Other"));
    }
}
