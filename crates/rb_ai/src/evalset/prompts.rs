pub fn question_generation_prompt(num_questions: usize, context: &str) -> String {
    format!(
        r#"Your task is to formulate exactly {num_questions} questions from the given context and provide the answer to each one.

The questions must satisfy the rules given below:
1. The question should make sense to humans even when read without the given context.
2. The question should be fully answered from the given context.
3. The question should be framed from a part of the context that contains important information. It can also be from tables, code, etc.
4. The answer to the question should not contain any links.
5. Mix difficulties: label each question "easy", "medium" or "hard".
6. The question must be reasonable and must be understood and responded to by humans.
7. Do not use phrases like 'provided context' in the question.
8. Avoid framing a question using the word "and" when it can be decomposed into more than one question.
9. The question should not contain more than 10 words; make use of abbreviations wherever possible.
10. List the chunk_id of every chunk the question and answer are based on. Use only chunk_id values that appear in the context.

Return JSON only, in exactly this shape:
{{"questions": [{{"question": "...?", "answer": "...", "difficulty": "easy|medium|hard", "chunk_ids": ["..."]}}]}}

context:
{context}
"#
    )
}
