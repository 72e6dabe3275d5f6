use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    FnArg, GenericArgument, Ident, ItemFn, LitStr, PathArguments, ReturnType, Token, Type,
    parse::{Parse, ParseStream, Result},
    parse_macro_input,
};

// ─── Attribute arguments ─────────────────────────────────────────────────────

/// Parsed `name = "...", provides = dyn Trait`.
struct ImplementationArgs {
    name: LitStr,
    provides: Type,
}

impl Parse for ImplementationArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut name = None;
        let mut provides = None;

        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match key.to_string().as_str() {
                "name" => name = Some(input.parse()?),
                "provides" => provides = Some(input.parse()?),
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown argument `{other}`; expected `name` or `provides`"),
                    ));
                }
            }
            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }

        let name: LitStr = name.ok_or_else(|| {
            syn::Error::new(Span::call_site(), "missing `name = \"...\"`")
        })?;
        if name.value().trim().is_empty() || name.value().contains(['(', ')']) {
            return Err(syn::Error::new(
                name.span(),
                "implementation name must be non-blank and free of parentheses",
            ));
        }
        let provides = provides.ok_or_else(|| {
            syn::Error::new(Span::call_site(), "missing `provides = dyn Trait`")
        })?;

        Ok(Self { name, provides })
    }
}

// ─── Signature classification ────────────────────────────────────────────────

/// What the single parameter of the constructor is.
enum ParamKind {
    None,
    Str,
    OptionStr,
    String,
    OptionString,
    Parameters,
}

/// How the return value reaches `Box<dyn Trait>`.
struct ReturnShape {
    fallible: bool,
    boxed: bool,
}

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(path) if path.qself.is_none() => path.path.segments.last(),
        _ => None,
    }
}

fn first_type_arg(segment: &syn::PathSegment) -> Option<&Type> {
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn is_str_ref(ty: &Type) -> bool {
    match ty {
        Type::Reference(reference) if reference.mutability.is_none() => {
            last_segment(&reference.elem).is_some_and(|s| s.ident == "str")
        }
        _ => false,
    }
}

fn is_string(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|s| s.ident == "String")
}

fn classify_param(ty: &Type) -> Option<ParamKind> {
    if is_str_ref(ty) {
        return Some(ParamKind::Str);
    }
    let segment = last_segment(ty)?;
    if segment.ident == "String" {
        return Some(ParamKind::String);
    }
    if segment.ident == "Parameters" {
        return Some(ParamKind::Parameters);
    }
    if segment.ident == "Option" {
        let inner = first_type_arg(segment)?;
        if is_str_ref(inner) {
            return Some(ParamKind::OptionStr);
        }
        if is_string(inner) {
            return Some(ParamKind::OptionString);
        }
    }
    None
}

fn classify_return(output: &ReturnType) -> Result<ReturnShape> {
    let ReturnType::Type(_, ty) = output else {
        return Err(syn::Error::new(
            Span::call_site(),
            "constructor must return the implementing type",
        ));
    };
    let mut value = ty.as_ref();
    let mut fallible = false;
    if let Some(segment) = last_segment(value).filter(|s| s.ident == "Result") {
        fallible = true;
        value = first_type_arg(segment).ok_or_else(|| {
            syn::Error::new_spanned(ty, "cannot read the success type of this `Result`")
        })?;
    }
    let boxed = last_segment(value).is_some_and(|s| s.ident == "Box");
    Ok(ReturnShape { fallible, boxed })
}

// ─── Expansion ───────────────────────────────────────────────────────────────

/// Implementation of the `#[implementation(...)]` attribute macro.
///
/// Leaves the decorated function unchanged and appends a wrapper with one of
/// the `Constructor` signatures plus a
/// `#[::spi_core::linkme::distributed_slice]` static registering it.
pub fn implementation(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as ImplementationArgs);
    let func = parse_macro_input!(item as ItemFn);

    match expand(&args, &func) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(args: &ImplementationArgs, func: &ItemFn) -> Result<TokenStream2> {
    let sig = &func.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "constructors must be synchronous",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &sig.generics,
            "constructors cannot be generic",
        ));
    }
    if sig.inputs.len() > 1 {
        return Err(syn::Error::new_spanned(
            &sig.inputs,
            "constructors take at most one parameter",
        ));
    }

    let kind = match sig.inputs.first() {
        None => ParamKind::None,
        Some(FnArg::Receiver(receiver)) => {
            return Err(syn::Error::new_spanned(
                receiver,
                "constructors cannot take `self`",
            ));
        }
        Some(FnArg::Typed(typed)) => classify_param(&typed.ty).ok_or_else(|| {
            syn::Error::new_spanned(
                &typed.ty,
                "unsupported parameter; expected `&str`, `Option<&str>`, `String`, \
                 `Option<String>` or `Parameters`",
            )
        })?,
    };
    let shape = classify_return(&sig.output)?;

    let fn_name = &sig.ident;
    let name = &args.name;
    let provides = &args.provides;
    let wrapper = Ident::new(&format!("__spi_construct_{fn_name}"), fn_name.span());
    let static_name = Ident::new(
        &format!("_SPI_IMPLEMENTATION_{}", fn_name.to_string().to_uppercase()),
        Span::call_site(),
    );

    let (wrapper_params, call, variant) = match kind {
        ParamKind::None => (quote!(), quote!(#fn_name()), quote!(Empty)),
        ParamKind::Str => (
            quote!(arg: ::std::option::Option<&str>),
            quote!(#fn_name(arg.unwrap_or(""))),
            quote!(Text),
        ),
        ParamKind::OptionStr => (
            quote!(arg: ::std::option::Option<&str>),
            quote!(#fn_name(arg)),
            quote!(Text),
        ),
        ParamKind::String => (
            quote!(arg: ::std::option::Option<&str>),
            quote!(#fn_name(arg.map(::std::borrow::ToOwned::to_owned).unwrap_or_default())),
            quote!(Text),
        ),
        ParamKind::OptionString => (
            quote!(arg: ::std::option::Option<&str>),
            quote!(#fn_name(arg.map(::std::borrow::ToOwned::to_owned))),
            quote!(Text),
        ),
        ParamKind::Parameters => (
            quote!(parameters: ::spi_core::Parameters),
            quote!(#fn_name(parameters)),
            quote!(Parameters),
        ),
    };

    let value = if shape.fallible {
        quote!(#call.map_err(::std::convert::Into::<::spi_core::BoxError>::into)?)
    } else {
        call
    };
    let object = if shape.boxed {
        quote!(#value)
    } else {
        quote!(::std::boxed::Box::new(#value))
    };

    Ok(quote! {
        #func

        #[doc(hidden)]
        fn #wrapper(#wrapper_params) -> ::spi_core::ConstructResult {
            let object: ::std::boxed::Box<#provides> = #object;
            ::std::result::Result::Ok(::spi_core::Instance::new(object))
        }

        #[::spi_core::linkme::distributed_slice(::spi_core::IMPLEMENTATIONS)]
        #[linkme(crate = ::spi_core::linkme)]
        static #static_name: ::spi_core::ImplementationEntry = ::spi_core::ImplementationEntry {
            name: #name,
            contract: <#provides as ::spi_core::Contract>::NAME,
            constructor: ::spi_core::Constructor::#variant(#wrapper),
        };
    })
}
