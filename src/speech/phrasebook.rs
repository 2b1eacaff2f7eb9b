//! Idle fillers spoken when nobody calls the avatar by name

use rand::seq::SliceRandom;
use rand::Rng;

use super::utterance::{Language, Utterance};
use crate::gesture::Gesture;

/// One filler line, with an optional English rendering
#[derive(Debug, Clone, Copy)]
pub struct Filler {
    pub es: &'static str,
    pub en: Option<&'static str>,
    pub gesture: &'static str,
}

impl Filler {
    /// Text in `language`, falling back to Spanish
    pub fn text(&self, language: Language) -> &'static str {
        match language {
            Language::En => self.en.unwrap_or(self.es),
            Language::Es => self.es,
        }
    }
}

const FILLERS: &[Filler] = &[
    Filler {
        es: "A Dinner le gusta que lo llamen por su nombre. Decí 'Dinner' y te escucho",
        en: Some("Dinner likes to be called by name. Say 'Dinner' and I'll listen"),
        gesture: "lado",
    },
    Filler {
        es: "Regla básica: si no decís 'Dinner', sigo comiendo bits.",
        en: Some("Basic rule: if you don't say 'Dinner', I keep eating bits"),
        gesture: "sospecha",
    },
    Filler {
        es: "¿Querés hablar conmigo? Fácil: decí 'Dinner' primero.",
        en: Some("Want to talk to me? Easy: say 'Dinner' first"),
        gesture: "feliz",
    },
    Filler {
        es: "Estoy en standby… activame diciendo 'Dinner'.",
        en: Some("I'm on standby... activate me by saying 'Dinner'"),
        gesture: "lado",
    },
    Filler {
        es: "Dinner no responde a gritos, solo a su nombre",
        en: Some("Dinner doesn't respond to shouts, only to its name"),
        gesture: "sospecha",
    },
    Filler {
        es: "Escaneando antojos… resultado: TODO. (Después de decir 'Dinner').",
        en: Some("Scanning cravings... result: EVERYTHING. (After saying 'Dinner')."),
        gesture: "sospecha",
    },
    Filler {
        es: "Confirmado: decir 'Dinner' fue una excelente decisión.",
        en: Some("Confirmed: saying 'Dinner' was an excellent decision"),
        gesture: "feliz",
    },
    Filler {
        es: "El hambre no negocia… pero Dinner sí, si lo llamás.",
        en: Some("Hunger doesn't negotiate... but Dinner does, if you call it"),
        gesture: "lado",
    },
    Filler {
        es: "Procesando pedido… activación por palabra clave detectada.",
        en: Some("Processing order... keyword activation detected"),
        gesture: "sospecha",
    },
    Filler {
        es: "Nivel de felicidad subiendo desde que dijiste 'Dinner'.",
        en: Some("Happiness level rising since you said 'Dinner'"),
        gesture: "feliz",
    },
    Filler {
        es: "Comida en camino… wake word correcta, paciencia en cooldown.",
        en: Some("Food on the way... correct wake word, patience on cooldown"),
        gesture: "lado",
    },
    Filler {
        es: "Alerta: decir 'Dinner' puede generar respuestas automáticas.",
        en: Some("Alert: saying 'Dinner' may generate automatic responses"),
        gesture: "sospecha",
    },
    Filler {
        es: "El universo aprueba que llames a Dinner por su nombre.",
        en: Some("The universe approves that you call Dinner by its name"),
        gesture: "feliz",
    },
    Filler {
        es: "Hambre derrotada tras pronunciación correcta de 'Dinner'.",
        en: Some("Hunger defeated after correct pronunciation of 'Dinner'"),
        gesture: "feliz",
    },
    Filler {
        es: "Comer solo es triste… por suerte llamaste a Dinner.",
        en: Some("Eating alone is sad... luckily you called Dinner"),
        gesture: "lado",
    },
];

/// Set of idle fillers to pick from
#[derive(Debug, Clone)]
pub struct Phrasebook {
    fillers: Vec<Filler>,
}

impl Default for Phrasebook {
    fn default() -> Self {
        Self::new(FILLERS.to_vec())
    }
}

impl Phrasebook {
    pub fn new(fillers: Vec<Filler>) -> Self {
        Self { fillers }
    }

    pub fn len(&self) -> usize {
        self.fillers.len()
    }

    /// Pick a pseudo-random filler rendered in `language`
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R, language: Language) -> Option<Utterance> {
        let filler = self.fillers.choose(rng)?;
        Some(Utterance::new(
            filler.text(language),
            language,
            Gesture::new(filler.gesture),
        ))
    }
}
