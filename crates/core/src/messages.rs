//! Localizable chat text.
//!
//! Every string the bot posts back into a channel is a named template with
//! named placeholders. A catalog is built once per process for the configured
//! locale; callers only choose the message and supply the values.

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::domain::poll::{Poll, PollId};
use crate::errors::{PollError, ValidationFailure};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    En,
    Ru,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ru" => Ok(Self::Ru),
            other => Err(format!("unsupported locale `{other}` (expected en|ru)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageHint {
    CreateInsufficient,
    Vote,
    Results,
    End,
    Delete,
}

impl UsageHint {
    fn template(self) -> &'static str {
        match self {
            Self::CreateInsufficient => "usage_create",
            Self::Vote => "usage_vote",
            Self::Results => "usage_results",
            Self::End => "usage_end",
            Self::Delete => "usage_delete",
        }
    }
}

pub struct MessageCatalog {
    locale: Locale,
    command_prefix: String,
    tera: Tera,
}

impl std::fmt::Debug for MessageCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCatalog")
            .field("locale", &self.locale)
            .field("command_prefix", &self.command_prefix)
            .finish_non_exhaustive()
    }
}

impl MessageCatalog {
    pub fn new(locale: Locale, command_prefix: impl Into<String>) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        let templates = match locale {
            Locale::En => EN_TEMPLATES,
            Locale::Ru => RU_TEMPLATES,
        };
        tera.add_raw_templates(templates.iter().copied())?;

        Ok(Self { locale, command_prefix: command_prefix.into(), tera })
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn help(&self) -> String {
        self.render("help", &self.base_context())
    }

    pub fn usage(&self, hint: UsageHint) -> String {
        self.render(hint.template(), &self.base_context())
    }

    pub fn unknown_command(&self) -> String {
        self.render("unknown_command", &self.base_context())
    }

    pub fn poll_created(&self, poll: &Poll) -> String {
        let labels: Vec<&str> = poll.options.iter().map(|option| option.label.as_str()).collect();
        let mut context = self.base_context();
        context.insert("id", poll.id.as_str());
        context.insert("question", &poll.question);
        context.insert("options", &labels);
        self.render("poll_created", &context)
    }

    pub fn vote_recorded(&self, poll_id: &PollId, choice: &str) -> String {
        let mut context = self.base_context();
        context.insert("id", poll_id.as_str());
        context.insert("choice", choice);
        self.render("vote_recorded", &context)
    }

    pub fn results(&self, poll: &Poll) -> String {
        let mut context = self.base_context();
        context.insert("id", poll.id.as_str());
        context.insert("question", &poll.question);
        context.insert("options", &poll.options);
        context.insert("total", &poll.total_votes());
        context.insert("closed", &poll.closed);
        self.render("poll_results", &context)
    }

    pub fn poll_ended(&self, poll_id: &PollId) -> String {
        let mut context = self.base_context();
        context.insert("id", poll_id.as_str());
        self.render("poll_ended", &context)
    }

    pub fn poll_deleted(&self, poll_id: &PollId) -> String {
        let mut context = self.base_context();
        context.insert("id", poll_id.as_str());
        self.render("poll_deleted", &context)
    }

    /// Chat-safe text for a failed command. Internal failures collapse into
    /// one generic apology so storage details never reach the channel.
    pub fn error(&self, error: &PollError) -> String {
        let mut context = self.base_context();
        let template = match error {
            PollError::Validation(failure) => match failure {
                ValidationFailure::NoOptions => "error_no_options",
                ValidationFailure::EmptyQuestion => "error_empty_question",
                ValidationFailure::QuestionTooLong { max } => {
                    context.insert("max", max);
                    "error_question_too_long"
                }
                ValidationFailure::EmptyOption => "error_empty_option",
                ValidationFailure::OptionTooLong { max } => {
                    context.insert("max", max);
                    "error_option_too_long"
                }
                ValidationFailure::DuplicateOption(label) => {
                    context.insert("label", label);
                    "error_duplicate_option"
                }
                ValidationFailure::InvalidPollId(raw) => {
                    context.insert("id", raw);
                    "error_invalid_poll_id"
                }
            },
            PollError::NotFound => "error_not_found",
            PollError::Unauthorized => "error_unauthorized",
            PollError::PollClosed => "error_poll_closed",
            PollError::DuplicateVote => "error_duplicate_vote",
            PollError::InvalidChoice(choice) => {
                context.insert("choice", choice);
                "error_invalid_choice"
            }
            PollError::Storage(_) | PollError::Cancelled => "error_internal",
        };
        self.render(template, &context)
    }

    fn base_context(&self) -> Context {
        let mut context = Context::new();
        context.insert("prefix", &self.command_prefix);
        context
    }

    fn render(&self, template: &str, context: &Context) -> String {
        self.tera.render(template, context).unwrap_or_else(|error| format!("[{template}: {error}]"))
    }
}

const EN_TEMPLATES: &[(&str, &str)] = &[
    (
        "help",
        "**Poll commands:**\n\
         \x20   {{ prefix }} create \"Question\" \"Option 1\" \"Option 2\"... - create a poll\n\
         \x20   {{ prefix }} vote \"Poll ID\" \"Choice\" - cast a vote\n\
         \x20   {{ prefix }} results \"Poll ID\" - show results\n\
         \x20   {{ prefix }} end \"Poll ID\" - close a poll\n\
         \x20   {{ prefix }} delete \"Poll ID\" - delete a poll\n\
         \x20   {{ prefix }} help - show this help",
    ),
    ("usage_create", "Not enough arguments. A question and at least one option are required."),
    ("usage_vote", "Usage: {{ prefix }} vote \"Poll ID\" \"Your choice\""),
    ("usage_results", "Usage: {{ prefix }} results \"Poll ID\""),
    ("usage_end", "Usage: {{ prefix }} end \"Poll ID\""),
    ("usage_delete", "Usage: {{ prefix }} delete \"Poll ID\""),
    ("unknown_command", "Unknown command. Type {{ prefix }} help for a list of commands."),
    (
        "poll_created",
        "Poll created! ID: `{{ id }}`\nQuestion: {{ question }}\nOptions:\n\
         {% for option in options %}{{ loop.index }}. {{ option }}\n{% endfor %}",
    ),
    ("vote_recorded", "Your vote in poll {{ id }} was recorded: {{ choice }}"),
    (
        "poll_results",
        "**Results for poll {{ id }}**\n{{ question }}\n\
         {% for option in options %}- {{ option.label }}: {{ option.votes }} votes\n{% endfor %}\
         Total votes: {{ total }}{% if closed %} (closed){% endif %}",
    ),
    ("poll_ended", "Poll {{ id }} is now closed"),
    ("poll_deleted", "Poll {{ id }} was deleted"),
    ("error_no_options", "A poll needs at least one option."),
    ("error_empty_question", "The question must not be empty."),
    ("error_question_too_long", "The question is too long (max {{ max }} characters)."),
    ("error_empty_option", "Options must not be empty."),
    ("error_option_too_long", "An option is too long (max {{ max }} characters)."),
    ("error_duplicate_option", "All options must be unique; `{{ label }}` is repeated."),
    ("error_invalid_poll_id", "`{{ id }}` is not a valid poll ID."),
    ("error_not_found", "Poll not found."),
    ("error_unauthorized", "Only the poll creator can do that."),
    ("error_poll_closed", "This poll is closed."),
    ("error_duplicate_vote", "You have already voted in this poll."),
    ("error_invalid_choice", "Option '{{ choice }}' does not exist."),
    ("error_internal", "Something went wrong while handling your command."),
];

const RU_TEMPLATES: &[(&str, &str)] = &[
    (
        "help",
        "**Команды опросов:**\n\
         \x20   {{ prefix }} create \"Вопрос\" \"Опция 1\" \"Опция 2\"... - Создать опрос\n\
         \x20   {{ prefix }} vote \"ID опроса\" \"Выбор\" - Проголосовать\n\
         \x20   {{ prefix }} results \"ID опроса\" - Показать результаты\n\
         \x20   {{ prefix }} end \"ID опроса\" - Завершить опрос\n\
         \x20   {{ prefix }} delete \"ID опроса\" - Удалить опрос\n\
         \x20   {{ prefix }} help - Показать эту справку",
    ),
    ("usage_create", "Недостаточно аргументов. Нужен вопрос и хотя бы одна опция"),
    ("usage_vote", "Формат: {{ prefix }} vote \"ID опроса\" \"Ваш выбор\""),
    ("usage_results", "Формат: {{ prefix }} results \"ID опроса\""),
    ("usage_end", "Формат: {{ prefix }} end \"ID опроса\""),
    ("usage_delete", "Формат: {{ prefix }} delete \"ID опроса\""),
    ("unknown_command", "Неизвестная команда. Введите {{ prefix }} help для справки"),
    (
        "poll_created",
        "Голосование создано успешно! ID: `{{ id }}`\nВопрос: {{ question }}\nВарианты:\n\
         {% for option in options %}{{ loop.index }}. {{ option }}\n{% endfor %}",
    ),
    ("vote_recorded", "Ваш голос в голосовании {{ id }} записан: {{ choice }}"),
    (
        "poll_results",
        "**Результаты опроса {{ id }}**\n{{ question }}\n\
         {% for option in options %}- {{ option.label }}: {{ option.votes }} голосов\n{% endfor %}\
         Всего голосов: {{ total }}{% if closed %} (завершен){% endif %}",
    ),
    ("poll_ended", "Голосование {{ id }} окончено"),
    ("poll_deleted", "Голосование {{ id }} удалено"),
    ("error_no_options", "Должна быть хотя бы одна опция"),
    ("error_empty_question", "Вопрос не может быть пустым"),
    ("error_question_too_long", "Вопрос слишком длинный (максимум {{ max }} символов)"),
    ("error_empty_option", "Вариант ответа не может быть пустым"),
    ("error_option_too_long", "Вариант ответа слишком длинный (максимум {{ max }} символов)"),
    ("error_duplicate_option", "Все опции в голосовании должны быть уникальными: `{{ label }}`"),
    ("error_invalid_poll_id", "Неверный формат ID опроса: `{{ id }}`"),
    ("error_not_found", "Опрос не найден"),
    ("error_unauthorized", "Только создатель может выполнить это действие"),
    ("error_poll_closed", "Опрос завершен"),
    ("error_duplicate_vote", "Вы уже голосовали в этом опросе"),
    ("error_invalid_choice", "Вариант '{{ choice }}' не существует"),
    ("error_internal", "Ошибка при формировании ответа"),
];
