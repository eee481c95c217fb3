/// Instructions sent with the staged documents in model mode.
pub fn search_prompt(query: &str) -> String {
    format!(
        "Search Query: {query}

Search through the provided documents and find ALL relevant passages that answer or relate to the query.
Be thorough - if multiple different sections contain relevant information, include them all.

For each relevant passage found, provide:
1. The complete text passage that contains the answer (preserve full context)
2. A relevance score between 0 and 1 (be precise in scoring - if multiple passages are equally relevant, give them the same score)
3. A detailed explanation of how this passage relates to or answers the query
4. The source document name

Return ALL passages that are highly relevant (don't limit to just the best match).
Format each result as a JSON object with these exact keys:
- text: the complete relevant passage
- score: a float between 0 and 1
- explanation: detailed explanation of relevance
- source: the document name

Return as a JSON array containing ALL relevant results."
    )
}
