//! User-visible message texts.

/// Broadcast carrying the day's question and the answer button.
pub fn question_broadcast(question: &str) -> String {
    format!("🧠 Question time!\n**{question}**\n👇 Press the button below to answer:")
}

pub fn generation_failed() -> String {
    "⚠️ I couldn't come up with today's question. I'll try again at the next scheduled time."
        .to_string()
}

pub fn not_a_target() -> String {
    "This question isn't meant for you 🙅".to_string()
}

pub fn already_waiting() -> String {
    "I'm already waiting for your answer in our private chat 💬".to_string()
}

pub fn no_active_round() -> String {
    "There is no open question right now. Check back after the next one is posted!".to_string()
}

/// Private prompt opening an answer session.
pub fn answer_prompt(question: &str) -> String {
    format!("Please answer the question by replying here:\n{question}")
}

pub fn answer_recorded() -> String {
    "✅ Answer recorded!".to_string()
}

pub fn answer_timed_out() -> String {
    "⌛ Time's up for this answer. Press the answer button again whenever you're ready.".to_string()
}

pub fn answer_expired() -> String {
    "A new question has been posted, so that one is closed. Take a look at today's question!"
        .to_string()
}

pub fn reply_not_expected() -> String {
    "Press the answer button under today's question first, then send your answer here."
        .to_string()
}

/// Combined announcement: the question, then each answer in roster order.
pub fn announcement<'a>(
    question: &str,
    answers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut text = format!("🎉 Everyone has answered!\n🔔 The question was: **{question}**");
    for (name, answer) in answers {
        text.push_str(&format!("\n📝 {name}'s answer: {answer}"));
    }
    text
}
