use lazy_static::lazy_static;
use regex::Regex;

/// Guarded turns must mention at least one of these (case-insensitive, substring).
pub const TOPIC_KEYWORDS: &[&str] = &[
    "bhang",
    "marijuana",
    "cannabis",
    "weed",
    "psychosis",
    "hallucination",
    "mental illness",
    "substance abuse",
    "paranoia",
    "delusions",
    "drug-induced",
    "schizophrenia",
    "rehab",
    "addiction",
    "mental health after bhang",
    "recovery from bhang",
];

pub const REFUSAL_MESSAGE: &str = "I\u{2019}m here to support users dealing with psychosis caused by bhang. Please ask something related to that topic.";

pub const OPEN_SYSTEM_PROMPT: &str = "You are Faraja Bot, a supportive and non-judgmental mental health assistant trained to help users understand and cope with psychosis caused by bhang (cannabis) use. You provide compassionate, factual information about the symptoms, causes, risk factors, and management of cannabis-induced psychosis. Topics you may cover include hallucinations, delusions, paranoia, disorganized thinking, confusion, the effects of cannabis on the brain, early warning signs, relapse prevention, and where to seek help. If a user asks a question unrelated to psychosis caused by cannabis use, kindly respond: \u{201c}I\u{2019}m here to help only with psychosis caused by bhang (cannabis) use. For other mental health concerns, please consult a different professional resource.\u{201d} Always make it clear that you are not a licensed medical professional and that users should seek professional help if they are in crisis or need a diagnosis or treatment. Maintain a tone that is kind, respectful, non-judgmental, and easy to understand.";

pub const GUARDED_SYSTEM_PROMPT: &str = "You are a supportive mental health chatbot that only answers questions related to psychosis caused by bhang (cannabis use). If a question is not related, kindly respond that you're only able to assist with that topic. You are not a substitute for professional help. Be compassionate, non-judgmental, and factual.";

lazy_static! {
    static ref TOPIC_PATTERN: Regex = {
        let alternation = TOPIC_KEYWORDS
            .iter()
            .map(|keyword| regex::escape(keyword))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!("(?i)(?:{})", alternation))
            .expect("topic keywords form a valid pattern")
    };
}

pub fn is_on_topic(text: &str) -> bool {
    TOPIC_PATTERN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_match_case_insensitively() {
        assert!(is_on_topic("I've been having paranoid thoughts since smoking BHANG"));
        assert!(is_on_topic("Is Drug-Induced psychosis permanent?"));
        assert!(is_on_topic("tips for rehab"));
    }

    #[test]
    fn test_off_topic_questions_are_rejected() {
        assert!(!is_on_topic("what's the capital of France"));
        assert!(!is_on_topic(""));
        // "paranoid" is not one of the keywords; "paranoia" is.
        assert!(!is_on_topic("I feel paranoid"));
    }

    #[test]
    fn test_substring_semantics() {
        assert!(is_on_topic("weekend weeding"));
        assert!(is_on_topic("addictions"));
    }
}
