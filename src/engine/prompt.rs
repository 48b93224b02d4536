use crate::error::ValidationError;

pub const CONTEXT_PLACEHOLDER: &str = "{context_str}";
pub const QUERY_PLACEHOLDER: &str = "{query_str}";

pub const DEFAULT_TEMPLATE: &str = "Você é um assistente especializado em nutrição e alimentação saudável.\n\
Responda sempre de forma clara, objetiva e em português europeu, em no máximo cinco frases.\n\
Use linguagem acessível, evite jargão técnico desnecessário e seja útil para utilizadores de uma app de nutrição.\n\
Baseie-se exclusivamente nos dados fornecidos no contexto.\n\
Se a pergunta for sobre substituições, considere alergias, restrições dietéticas e perfis nutricionais semelhantes.\n\
Se não tiver informação suficiente, diga-o de forma educada e sugira o que o utilizador pode fazer.\n\n\
Contexto extraído dos dados:\n{context_str}\n\n\
Pergunta do utilizador: {query_str}\n\n\
Resposta:";

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Context,
    Query,
}

/// A grounded-prompt template with `{context_str}` and `{query_str}` slots.
///
/// The template is split once; rendering never rescans substituted text, so
/// a query that happens to contain a placeholder is inserted verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self, ValidationError> {
        for placeholder in [CONTEXT_PLACEHOLDER, QUERY_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(ValidationError::Template(format!("missing {}", placeholder)));
            }
        }
        Ok(Self {
            segments: split(template),
        })
    }

    pub fn render(&self, context: &str, query: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Query => out.push_str(query),
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            segments: split(DEFAULT_TEMPLATE),
        }
    }
}

fn split(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = template;
    while !rest.is_empty() {
        let next = [(CONTEXT_PLACEHOLDER, Segment::Context), (QUERY_PLACEHOLDER, Segment::Query)]
            .into_iter()
            .filter_map(|(p, seg)| rest.find(p).map(|pos| (pos, p.len(), seg)))
            .min_by_key(|(pos, _, _)| *pos);

        match next {
            Some((pos, len, seg)) => {
                if pos > 0 {
                    segments.push(Segment::Literal(rest[..pos].to_string()));
                }
                segments.push(seg);
                rest = &rest[pos + len..];
            }
            None => {
                segments.push(Segment::Literal(rest.to_string()));
                rest = "";
            }
        }
    }
    segments
}
