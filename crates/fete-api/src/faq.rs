//! Keyword-matching assistant that answers common questions before a chat is
//! handed to staff. Matching is deterministic: the first entry in table order
//! with a keyword contained in the lowercased message wins.

/// Delay clients should show a typing indicator for before revealing a reply.
pub const TYPING_DELAY_MS: u64 = 1000;

/// Display name on persisted assistant replies.
pub const BOT_NAME: &str = "FAQ Bot";

const LIVE_TRIGGERS: [&str; 2] = ["live chat", "speak to someone"];

pub struct FaqEntry {
    pub id: u32,
    pub question: &'static str,
    pub answer: &'static str,
    pub keywords: &'static [&'static str],
}

pub static FAQ: [FaqEntry; 10] = [
    FaqEntry {
        id: 1,
        question: "What types of events do you plan?",
        answer: "We specialize in weddings, corporate events, birthday parties, anniversaries, baby showers, and custom celebrations. Our team can handle events of any size, from intimate gatherings to large-scale celebrations.",
        keywords: &["events", "types", "wedding", "corporate", "birthday", "party", "celebration"],
    },
    FaqEntry {
        id: 2,
        question: "How much do your services cost?",
        answer: "Our pricing varies based on event type, size, and services needed. Wedding packages start at $2,500, corporate events from $1,500, and social events from $800. Contact us for a personalized quote based on your specific needs.",
        keywords: &["cost", "price", "pricing", "budget", "expensive", "cheap", "quote"],
    },
    FaqEntry {
        id: 3,
        question: "How far in advance should I book?",
        answer: "We recommend booking 3-6 months in advance for weddings, 2-3 months for corporate events, and 4-6 weeks for social gatherings. However, we can accommodate shorter timelines based on availability.",
        keywords: &["book", "advance", "timeline", "when", "schedule", "availability"],
    },
    FaqEntry {
        id: 4,
        question: "Do you provide vendors and catering?",
        answer: "Yes! We have partnerships with trusted vendors including caterers, photographers, florists, and entertainment. We can coordinate all aspects of your event or work with your preferred vendors.",
        keywords: &["vendors", "catering", "food", "photographer", "florist", "entertainment", "music"],
    },
    FaqEntry {
        id: 5,
        question: "What areas do you serve?",
        answer: "We primarily serve the greater metropolitan area and surrounding regions within a 50-mile radius. For destination events, additional travel fees may apply. Contact us to discuss your location.",
        keywords: &["location", "area", "serve", "travel", "destination", "where"],
    },
    FaqEntry {
        id: 6,
        question: "Can I make changes to my event after booking?",
        answer: "Absolutely! We understand that plans can change. Minor adjustments can usually be made up to 2 weeks before your event. Major changes may require additional fees and are subject to vendor availability.",
        keywords: &["changes", "modify", "update", "cancel", "reschedule", "flexible"],
    },
    FaqEntry {
        id: 7,
        question: "Do you offer payment plans?",
        answer: "Yes, we offer flexible payment options. Typically, we require a 30% deposit to secure your date, with the remaining balance due 2 weeks before your event. Custom payment plans can be arranged.",
        keywords: &["payment", "deposit", "installment", "plan", "finance", "money"],
    },
    FaqEntry {
        id: 8,
        question: "What happens if there's bad weather for outdoor events?",
        answer: "We always have contingency plans for outdoor events. This includes backup indoor venues, tent rentals, or rescheduling options. Weather monitoring begins 7 days before your event.",
        keywords: &["weather", "outdoor", "rain", "backup", "tent", "indoor", "contingency"],
    },
    FaqEntry {
        id: 9,
        question: "Do you handle decorations and setup?",
        answer: "Yes! Our full-service packages include decoration design, setup, and breakdown. We handle everything from centerpieces and lighting to linens and floral arrangements.",
        keywords: &["decorations", "setup", "design", "flowers", "centerpieces", "lighting", "breakdown"],
    },
    FaqEntry {
        id: 10,
        question: "How do I get started?",
        answer: "Getting started is easy! You can book a free consultation through our website, call us directly, or use this chat to connect with our team. We'll discuss your vision and create a custom proposal.",
        keywords: &["start", "begin", "consultation", "contact", "book", "proposal"],
    },
];

pub const WELCOME_MESSAGE: &str = "👋 Welcome to Elegant Events! I'm here to help you.

How can I assist you today?

🤖 **Ask me about:**
• Event types and services
• Pricing and packages
• Booking process
• Vendors and catering
• Timeline and planning

💬 **Or choose:**
• Type your question for instant answers
• Say \"live chat\" to speak with our team
• Browse our FAQ below

What would you like to know?";

pub const LIVE_CHAT_MESSAGE: &str = "🔄 Connecting you with our live support team...

A team member will be with you shortly. In the meantime, feel free to describe your event needs and we'll make sure the right person assists you.

**Average response time:** 2-5 minutes during business hours
**Business hours:** Mon-Fri 9AM-6PM, Sat 10AM-4PM";

pub const NO_MATCH_MESSAGE: &str = "I'm not sure about that specific question, but I'd love to help!

You can:
• Try rephrasing your question
• Type \"live chat\" to speak with our team
• Browse our common questions below:

**Popular topics:**
• Event pricing and packages
• Booking timeline
• Services included
• Vendor coordination
• Payment options

What else can I help you with?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaqReply {
    /// `None` once the conversation is with a human.
    pub content: Option<&'static str>,
    pub live_mode: bool,
}

/// First entry, in table order, with a keyword inside `message`.
pub fn find_answer(message: &str) -> Option<&'static FaqEntry> {
    let lowered = message.to_lowercase();
    FAQ.iter()
        .find(|entry| entry.keywords.iter().any(|keyword| lowered.contains(keyword)))
}

pub fn wants_live_chat(message: &str) -> bool {
    let lowered = message.to_lowercase();
    LIVE_TRIGGERS.iter().any(|trigger| lowered.contains(trigger))
}

/// Decide the assistant's reply to one user message.
pub fn respond(message: &str, live_mode: bool) -> FaqReply {
    if wants_live_chat(message) {
        return FaqReply { content: Some(LIVE_CHAT_MESSAGE), live_mode: true };
    }
    if live_mode {
        return FaqReply { content: None, live_mode: true };
    }

    let content = find_answer(message).map_or(NO_MATCH_MESSAGE, |entry| entry.answer);
    FaqReply { content: Some(content), live_mode: false }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_case_insensitive() {
        let entry = find_answer("What does a WEDDING cost?").unwrap();
        // "wedding" (entry 1) comes before "cost" (entry 2) in table order.
        assert_eq!(entry.id, 1);
        assert_eq!(find_answer("Is it EXPENSIVE?").unwrap().id, 2);
    }

    #[test]
    fn earlier_entry_wins_shared_keyword() {
        // "book" appears in entries 3 and 10.
        assert_eq!(find_answer("how do i book").unwrap().id, 3);
    }

    #[test]
    fn unmatched_message_gets_fallback() {
        let reply = respond("zzz", false);
        assert_eq!(reply.content, Some(NO_MATCH_MESSAGE));
        assert!(!reply.live_mode);
    }

    #[test]
    fn live_trigger_switches_mode() {
        let reply = respond("Can I Speak To Someone please", false);
        assert_eq!(reply.content, Some(LIVE_CHAT_MESSAGE));
        assert!(reply.live_mode);
    }

    #[test]
    fn live_mode_suppresses_answers() {
        let reply = respond("how much does it cost", true);
        assert_eq!(reply, FaqReply { content: None, live_mode: true });
    }

    #[test]
    fn same_input_same_answer() {
        assert_eq!(respond("Do you do catering?", false), respond("Do you do catering?", false));
    }

    #[test]
    fn ids_follow_table_order() {
        let ids: Vec<u32> = FAQ.iter().map(|e| e.id).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }
}
