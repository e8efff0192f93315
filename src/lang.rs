//! Language detection and the bot's reply strings.
//!
//! Detection is a cheap stop-word vote between Spanish, English and
//! Afrikaans; ties and empty input fall back to Spanish, the channel's home
//! language. Celebration greetings stay Spanish on purpose, quota and
//! cooldown replies follow the speaker.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Es,
    En,
    Af,
}

impl Lang {
    pub fn code(self) -> &'static str {
        match self {
            Lang::Es => "es",
            Lang::En => "en",
            Lang::Af => "af",
        }
    }

    /// Instruction fragment handed to the model so answers match the speaker.
    pub fn reply_instruction(self) -> &'static str {
        match self {
            Lang::Es => "Responde en español.",
            Lang::En => "Reply in English.",
            Lang::Af => "Antwoord in Afrikaans.",
        }
    }
}

const ES_WORDS: &[&str] = &[
    "que", "de", "la", "el", "es", "una", "por", "para", "con", "como", "pero", "más", "está",
    "qué", "hola", "gracias", "también", "cuando", "tengo", "hace",
];
const EN_WORDS: &[&str] = &[
    "the", "is", "are", "what", "how", "and", "you", "for", "with", "this", "that", "have",
    "not", "but", "hello", "thanks", "when", "why", "can", "will",
];
const AF_WORDS: &[&str] = &[
    "die", "is", "het", "nie", "wat", "hoe", "en", "jy", "vir", "met", "hierdie", "daardie",
    "maar", "hallo", "dankie", "wanneer", "hoekom", "kan", "sal", "baie",
];

/// Pick the language whose stop words appear most in `text`.
pub fn detect(text: &str) -> Lang {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let score = |set: &[&str]| words.iter().filter(|w| set.contains(&w.as_str())).count();
    let es = score(ES_WORDS);
    let en = score(EN_WORDS);
    let af = score(AF_WORDS);

    if en > es && en > af {
        Lang::En
    } else if af > es && af >= en {
        Lang::Af
    } else {
        Lang::Es
    }
}

/// Remembers each user's language so one ambiguous message ("ok", "xD")
/// does not flip the bot back to Spanish mid-conversation.
#[derive(Default)]
pub struct LangMap {
    by_user: Mutex<HashMap<String, Lang>>,
}

impl LangMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect the language of `text` and update the user's entry; when the
    /// text carries no signal, fall back to the user's last known language.
    pub fn update(&self, login: &str, text: &str) -> Lang {
        let login = login.to_lowercase();
        let mut map = self.by_user.lock().unwrap_or_else(|e| e.into_inner());
        let detected = detect(text);
        if detected == Lang::Es && !has_signal(text) {
            return *map.get(&login).unwrap_or(&Lang::Es);
        }
        map.insert(login, detected);
        detected
    }
}

/// Whether the text contains any stop word at all.
fn has_signal(text: &str) -> bool {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| {
            ES_WORDS.contains(&w) || EN_WORDS.contains(&w) || AF_WORDS.contains(&w)
        })
}

const PIROPOS: &[&str] = &[
    "eres más bonito que un domingo sin madrugar 😍",
    "si fueras un emote, serías el más spameado del canal 💜",
    "tienes más arte que todo el front page de Twitch junto ✨",
    "contigo hasta el lag se hace agradable 😏",
    "eres la razón de que el chat tenga buen rollo hoy 🌟",
];

pub fn random_piropo(name: &str) -> String {
    let piropo = PIROPOS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PIROPOS[0]);
    format!("@{} {}", name, piropo)
}

pub fn cooldown_active(lang: Lang, mins: u64) -> String {
    match lang {
        Lang::Es => format!("tranqui, espera {} min antes de buscar otra vez 🔎", mins),
        Lang::En => format!("easy there, wait {} min before searching again 🔎", mins),
        Lang::Af => format!("rustig, wag {} min voor jy weer soek 🔎", mins),
    }
}

pub fn message_limit_reached(lang: Lang, limit: u32) -> String {
    match lang {
        Lang::Es => format!("ya usaste tus {} mensajes de hoy, crack 😅", limit),
        Lang::En => format!("you already used your {} messages today 😅", limit),
        Lang::Af => format!("jy het reeds jou {} boodskappe vir vandag gebruik 😅", limit),
    }
}

pub fn search_limit_reached(lang: Lang, limit: u32, cooldown_mins: u64) -> String {
    match lang {
        Lang::Es => format!(
            "llegaste a tus {} búsquedas, vuelve en {} min ⏳",
            limit, cooldown_mins
        ),
        Lang::En => format!(
            "you hit your {} searches, come back in {} min ⏳",
            limit, cooldown_mins
        ),
        Lang::Af => format!(
            "jy het jou {} soektogte bereik, kom terug oor {} min ⏳",
            limit, cooldown_mins
        ),
    }
}

pub fn tier_forbidden(lang: Lang) -> &'static str {
    match lang {
        Lang::Es => "esa función es solo para subs del canal 💜",
        Lang::En => "that one is subs-only 💜",
        Lang::Af => "daardie een is net vir subs 💜",
    }
}

pub fn usage_report(lang: Lang, name: &str, used: u32, limit: Option<u32>) -> String {
    match (lang, limit) {
        (Lang::Es, Some(limit)) => format!(
            "@{} llevas {}/{} mensajes esta sesión 📊",
            name, used, limit
        ),
        (Lang::Es, None) => format!("@{} llevas {} mensajes y no tienes límite 📊", name, used),
        (Lang::En, Some(limit)) => {
            format!("@{} you are at {}/{} messages this session 📊", name, used, limit)
        }
        (Lang::En, None) => format!("@{} you sent {} messages, no limit for you 📊", name, used),
        (Lang::Af, Some(limit)) => {
            format!("@{} jy is op {}/{} boodskappe hierdie sessie 📊", name, used, limit)
        }
        (Lang::Af, None) => {
            format!("@{} jy het {} boodskappe gestuur, geen limiet nie 📊", name, used)
        }
    }
}

pub fn wait_a_moment(lang: Lang) -> &'static str {
    match lang {
        Lang::Es => "dame unos segundos, que no doy abasto 🫠",
        Lang::En => "give me a few seconds, I can't keep up 🫠",
        Lang::Af => "gee my 'n paar sekondes 🫠",
    }
}

pub fn ai_unavailable(lang: Lang) -> &'static str {
    match lang {
        Lang::Es => "se me ha frito el cerebro, pregúntame en un rato 🤖",
        Lang::En => "my brain just fried, ask me again in a bit 🤖",
        Lang::Af => "my brein is gaar, vra my netnou weer 🤖",
    }
}

pub fn no_permission(lang: Lang) -> &'static str {
    match lang {
        Lang::Es => "eso solo lo puede pedir el jefe del canal 👑",
        Lang::En => "only the boss of the channel can ask for that 👑",
        Lang::Af => "net die baas van die kanaal kan dit vra 👑",
    }
}

pub fn clip_cooldown(lang: Lang, secs: u64) -> String {
    match lang {
        Lang::Es => format!("acabo de hacer un clip, espera {} segundos ✂️", secs),
        Lang::En => format!("I just made a clip, wait {} seconds ✂️", secs),
        Lang::Af => format!("ek het nou net 'n clip gemaak, wag {} sekondes ✂️", secs),
    }
}

pub fn clip_created(lang: Lang, url: &str) -> String {
    match lang {
        Lang::Es => format!("¡clip guardado! 🎬 {}", url),
        Lang::En => format!("clip saved! 🎬 {}", url),
        Lang::Af => format!("clip gestoor! 🎬 {}", url),
    }
}

pub fn clip_failed(lang: Lang) -> &'static str {
    match lang {
        Lang::Es => "no pude crear el clip, ¿está el stream en directo? 🎥",
        Lang::En => "could not create the clip, is the stream live? 🎥",
        Lang::Af => "kon nie die clip maak nie, is die stream aan? 🎥",
    }
}

pub fn clip_help(lang: Lang, min: u32, max: u32, default: u32) -> String {
    match lang {
        Lang::Es => format!(
            "usa !clip [segundos] [título] para guardar el momento, entre {} y {} segundos (por defecto {}); por ejemplo '!clip 30 Momento épico'",
            min, max, default
        ),
        Lang::En => format!(
            "use !clip [seconds] [title] to save the moment, between {} and {} seconds (default {}); for example '!clip 30 Epic moment'",
            min, max, default
        ),
        Lang::Af => format!(
            "gebruik !clip [sekondes] [titel] om die oomblik te stoor, tussen {} en {} sekondes (verstek {}); byvoorbeeld '!clip 30 Epiese oomblik'",
            min, max, default
        ),
    }
}

pub fn nothing_found(lang: Lang) -> &'static str {
    match lang {
        Lang::Es => "no encontré nada de eso, lo siento 🔎",
        Lang::En => "could not find anything about that, sorry 🔎",
        Lang::Af => "kon niks daaroor kry nie, jammer 🔎",
    }
}

pub fn empty_question(lang: Lang) -> &'static str {
    match lang {
        Lang::Es => "dime algo, que no leo mentes 🤔",
        Lang::En => "say something, I can't read minds 🤔",
        Lang::Af => "sê iets, ek kan nie gedagtes lees nie 🤔",
    }
}

pub fn nothing_to_summarize() -> &'static str {
    "aún no ha pasado nada digno de contar 📝"
}

pub fn online(bot_name: &str) -> String {
    format!("¡{} en línea! listo para zurrar 🤖", bot_name)
}

// Celebrations are part of the channel's voice and stay in Spanish.

pub fn watched_welcome(name: &str, emote: &str) -> String {
    format!("¡{} por aquí! qué bueno verte {}", name, emote)
}

pub fn greet_sub(name: &str, emote: &str) -> String {
    format!("¡{} se ha suscrito! bienvenido a la familia {}", name, emote)
}

pub fn greet_resub(name: &str, months: u32, emote: &str) -> String {
    format!("¡{} lleva {} meses con nosotros! gracias {}", name, months, emote)
}

pub fn greet_gift(gifter: &str, recipient: &str, emote: &str) -> String {
    format!("¡{} le ha regalado una sub a {}! qué detallazo {}", gifter, recipient, emote)
}

pub fn greet_mystery(gifter: &str, count: u32, emote: &str) -> String {
    format!("¡{} está regalando {} subs! menuda locura {}", gifter, count, emote)
}

pub fn greet_raid(from: &str, viewers: u64, emote: &str) -> String {
    format!("¡raid de {} con {} personas! bienvenidos todos {}", from, viewers, emote)
}

pub fn greet_cheer(name: &str, bits: u64, emote: &str) -> String {
    format!("¡{} ha tirado {} bits! gracias por el apoyo {}", name, bits, emote)
}

pub fn greet_streak(name: &str, streak: u32, emote: &str) -> String {
    format!("¡{} lleva {} directos seguidos! eso es fidelidad {}", name, streak, emote)
}
