use proc_macro2::Span;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Ident, LitInt, LitStr, Token};

const NOTE_IDENTS: [&str; 12] = [
    "C", "CSharp", "D", "DSharp", "E", "F", "FSharp", "G", "GSharp", "A", "ASharp", "B",
];

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const OCTAVES: usize = 9;

fn note_to_freq(octave: usize, note: usize) -> f64 {
    const A4_NOTE_NUMBER: i32 = 9;
    const A4_OCTAVE: i32 = 4;
    const A4_FREQUENCY: f64 = 440.0;

    let n = (octave as i32 - A4_OCTAVE) * 12 + (note as i32 - A4_NOTE_NUMBER);
    A4_FREQUENCY * 2_f64.powf(n as f64 / 12.0)
}

/// Resolves a note name like `D#7` (or its flat spelling `Eb7`) to the variant identifier.
fn note_ident(lit: &LitStr) -> syn::Result<Ident> {
    let value = lit.value();
    let split = value
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| syn::Error::new(lit.span(), "note name needs an octave, like `A4`"))?;
    let (name, octave) = value.split_at(split);
    let octave: usize = octave
        .parse()
        .ok()
        .filter(|&o| o < OCTAVES)
        .ok_or_else(|| syn::Error::new(lit.span(), "octave must be between 0 and 8"))?;

    let index = match NOTE_NAMES.iter().position(|&n| n == name) {
        Some(index) => index,
        None => {
            let flat = name
                .strip_suffix('b')
                .and_then(|natural| NOTE_NAMES.iter().position(|&n| n == natural))
                .ok_or_else(|| syn::Error::new(lit.span(), format!("unknown note `{}`", name)))?;
            if flat == 0 {
                return Err(syn::Error::new(lit.span(), "`Cb` isn't supported, use `B`"));
            }
            flat - 1
        }
    };

    Ok(Ident::new(
        &format!("{}{}", NOTE_IDENTS[index], octave),
        lit.span(),
    ))
}

/// A procedural macro that generates a pub enum for musical notes.
///
/// It generates notes from C0 to B8, including sharps, and provides methods to get the frequency in Hz and the string representation of each note.
#[proc_macro]
pub fn musical_notes(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    if !input.is_empty() {
        return syn::Error::new(Span::call_site(), "This macro does not take any input")
            .to_compile_error()
            .into();
    }

    let mut all_note_idents = Vec::with_capacity(NOTE_IDENTS.len() * OCTAVES);
    let mut all_note_names = Vec::with_capacity(NOTE_NAMES.len() * OCTAVES);
    let mut all_note_freqs = Vec::with_capacity(NOTE_IDENTS.len() * OCTAVES);

    for octave in 0..OCTAVES {
        for (i, &note_ident) in NOTE_IDENTS.iter().enumerate() {
            let ident_str = format!("{}{}", note_ident, octave);
            let note_ident = Ident::new(&ident_str, Span::call_site());
            let note_name = format!("{}{}", NOTE_NAMES[i], octave);
            let freq = note_to_freq(octave, i);
            all_note_idents.push(quote! { #note_ident });
            all_note_names.push(quote! { #note_name });
            all_note_freqs.push(quote! { #freq });
        }
    }

    quote!(
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MusicalNote {
            #(#all_note_idents),*
        }

        impl MusicalNote {
            pub fn as_freq_hz(&self) -> f64 {
                match self {
                    #(MusicalNote::#all_note_idents => #all_note_freqs),*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    #(MusicalNote::#all_note_idents => #all_note_names),*
                }
            }
        }

        impl ::std::str::FromStr for MusicalNote {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s {
                    #(#all_note_names => ::std::result::Result::Ok(MusicalNote::#all_note_idents),)*
                    _ => ::std::result::Result::Err(::std::format!("unknown note {:?}", s)),
                }
            }
        }

        impl ::std::fmt::Display for MusicalNote {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    )
    .into()
}

/// A procedural macro that converts a string literal representing a musical note into the corresponding `MusicalNote` enum variant.
///
/// It *does not* handle importing the `MusicalNote` enum, but assumes it has been defined using the `musical_notes!()` macro and
/// is available in the current scope.
#[proc_macro]
pub fn note(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input_str = parse_macro_input!(input as LitStr);
    match note_ident(&input_str) {
        Ok(ident) => quote!(MusicalNote::#ident).into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct ToneInput {
    note: LitStr,
    millis: LitInt,
}

impl Parse for ToneInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let note = input.parse()?;
        input.parse::<Token![for]>()?;
        let millis: LitInt = input.parse()?;
        if millis.suffix() != "ms" {
            return Err(syn::Error::new(millis.span(), "duration must be in `ms`, like `50ms`"));
        }
        Ok(Self { note, millis })
    }
}

/// Builds a `Tone` playing a note for a number of milliseconds: `tone!("F4" for 50ms)`.
///
/// Like [note!], it assumes `MusicalNote` and `Tone` are in scope.
#[proc_macro]
pub fn tone(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ToneInput { note, millis } = parse_macro_input!(input as ToneInput);
    let ident = match note_ident(&note) {
        Ok(ident) => ident,
        Err(e) => return e.to_compile_error().into(),
    };
    let millis = match millis.base10_parse::<u64>() {
        Ok(millis) => millis,
        Err(e) => return e.to_compile_error().into(),
    };

    quote!(
        Tone::new(MusicalNote::#ident, ::std::time::Duration::from_millis(#millis))
    )
    .into()
}
