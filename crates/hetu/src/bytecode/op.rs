use crate::error::{HetuError, RunResult};

macro_rules! byte_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $err:path {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value,)*
        }

        impl $name {
            pub(crate) fn from_byte(byte: u8) -> RunResult<Self> {
                match byte {
                    $($value => Ok(Self::$variant),)*
                    other => Err($err(other)),
                }
            }
        }
    };
}

byte_enum! {
    /// The instruction set. Byte values are the wire format and never change
    /// meaning between compatible compiler versions.
    pub enum Opcode : HetuError::unknown_op_code {
        // Meta
        EndOfCode = 0x00,
        EndOfModule = 0x01,
        EndOfFile = 0x02,
        EndOfFunc = 0x03,
        EndOfExec = 0x04,
        EndOfStmt = 0x05,
        EndOfCodeBlock = 0x06,
        LineInfo = 0x07,
        File = 0x08,
        CodeBlock = 0x09,
        ConstIntTable = 0x0A,
        ConstFloatTable = 0x0B,
        ConstStringTable = 0x0C,

        // Register traffic
        Local = 0x10,
        Register = 0x11,
        CreateStackFrame = 0x12,
        RetractStackFrame = 0x13,

        // Control flow
        Skip = 0x18,
        Anchor = 0x19,
        ClearAnchor = 0x1A,
        Goto = 0x1B,
        LoopPoint = 0x1C,
        BreakLoop = 0x1D,
        ContinueLoop = 0x1E,
        IfStmt = 0x1F,
        WhileStmt = 0x20,
        DoStmt = 0x21,
        SwitchStmt = 0x22,

        // Logic and arithmetic
        LogicalOr = 0x28,
        LogicalAnd = 0x29,
        IfNull = 0x2A,
        Equal = 0x2B,
        NotEqual = 0x2C,
        Lesser = 0x2D,
        Greater = 0x2E,
        LesserOrEqual = 0x2F,
        GreaterOrEqual = 0x30,
        Add = 0x31,
        Subtract = 0x32,
        Multiply = 0x33,
        Devide = 0x34,
        TruncatingDevide = 0x35,
        Modulo = 0x36,
        Negative = 0x37,
        LogicalNot = 0x38,
        BitwiseNot = 0x39,
        BitwiseOr = 0x3A,
        BitwiseXor = 0x3B,
        BitwiseAnd = 0x3C,
        LeftShift = 0x3D,
        RightShift = 0x3E,
        UnsignedRightShift = 0x3F,

        // Type operations
        TypeAs = 0x44,
        TypeIs = 0x45,
        TypeIsNot = 0x46,
        TypeValueOf = 0x47,
        DecltypeOf = 0x48,

        // Member access
        MemberGet = 0x4C,
        MemberSet = 0x4D,
        SubGet = 0x4E,
        SubSet = 0x4F,

        // Declarations
        ImportExportDecl = 0x54,
        TypeAliasDecl = 0x55,
        FuncDecl = 0x56,
        ClassDecl = 0x57,
        ClassDeclEnd = 0x58,
        ExternalEnumDecl = 0x59,
        StructDecl = 0x5A,
        VarDecl = 0x5B,
        DestructuringDecl = 0x5C,
        ConstDecl = 0x5D,
        NamespaceDecl = 0x5E,
        NamespaceDeclEnd = 0x5F,

        // Assertions and errors
        Assertion = 0x64,
        Throws = 0x65,
        Delete = 0x66,

        // Assignment
        Assign = 0x6A,

        // Call
        Call = 0x70,

        // Async
        AwaitedValue = 0x74,
    }
}

byte_enum! {
    /// Payload selector of the `local` opcode.
    pub enum LiteralKind : HetuError::unknown_value_type {
        Null = 0,
        True = 1,
        False = 2,
        ConstInt = 3,
        ConstFloat = 4,
        ConstString = 5,
        String = 6,
        StringInterpolation = 7,
        Identifier = 8,
        List = 9,
        Struct = 10,
        Function = 11,
        Type = 12,
    }
}

byte_enum! {
    /// Selector of a type literal.
    pub enum TypeKind : HetuError::unknown_value_type {
        Intrinsic = 0,
        Nominal = 1,
        Function = 2,
        Structural = 3,
    }
}

byte_enum! {
    /// Encoded intrinsic type constants.
    pub enum IntrinsicCode : HetuError::unknown_value_type {
        Any = 0,
        Unknown = 1,
        Void = 2,
        Never = 3,
        Type = 4,
        Function = 5,
        Namespace = 6,
        Null = 7,
    }
}

/// The named operand slots of a stack frame.
///
/// These are staging areas the compiler addresses by role, not a register
/// allocator: at most one live value per slot per expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    LocalValue = 0,
    LocalSymbol = 1,
    AdditiveLeft = 2,
    MultiplicativeLeft = 3,
    RelationLeft = 4,
    EqualLeft = 5,
    AndLeft = 6,
    OrLeft = 7,
    IfNullLeft = 8,
    BitwiseOrLeft = 9,
    BitwiseXorLeft = 10,
    BitwiseAndLeft = 11,
    BitwiseShiftLeft = 12,
    PostfixObject = 13,
    PostfixKey = 14,
    AssignRight = 15,
}

/// Number of slots in a frame's register bank.
pub const REGISTER_COUNT: usize = 16;

impl Register {
    pub(crate) fn from_byte(byte: u8) -> RunResult<Self> {
        match byte {
            0 => Ok(Self::LocalValue),
            1 => Ok(Self::LocalSymbol),
            2 => Ok(Self::AdditiveLeft),
            3 => Ok(Self::MultiplicativeLeft),
            4 => Ok(Self::RelationLeft),
            5 => Ok(Self::EqualLeft),
            6 => Ok(Self::AndLeft),
            7 => Ok(Self::OrLeft),
            8 => Ok(Self::IfNullLeft),
            9 => Ok(Self::BitwiseOrLeft),
            10 => Ok(Self::BitwiseXorLeft),
            11 => Ok(Self::BitwiseAndLeft),
            12 => Ok(Self::BitwiseShiftLeft),
            13 => Ok(Self::PostfixObject),
            14 => Ok(Self::PostfixKey),
            15 => Ok(Self::AssignRight),
            other => Err(HetuError::bytecode(format!("register index {other} out of range"))),
        }
    }
}
